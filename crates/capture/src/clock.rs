// Timestamp rebasing for the recording pipeline.
//
// The OS screen and audio subsystems do not start delivering at the same
// instant, and their native timestamps are nowhere near zero. Rebasing both
// tracks against independent origins produces audible A/V drift at the start
// of the file; rebasing both against the first-arriving sample's timestamp
// keeps the original relative offset and puts the first sample at or near
// zero.

use crate::sample::{Nanos, RawSample, Track};

/// Rebases native sample timestamps to a single shared origin.
///
/// The first sample of a session, whichever track it arrives on, sets the
/// origin. Every subsequent sample on either track is emitted with
/// `native_pts - origin`, clamped so a track never goes backwards.
#[derive(Debug, Default)]
pub struct TimestampNormalizer {
    origin: Option<Nanos>,
    origin_track: Option<Track>,
    seen_video: bool,
    seen_audio: bool,
    last_video: Nanos,
    last_audio: Nanos,
}

impl TimestampNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; the next sample establishes a fresh origin.
    /// Called on every `start` so a reused pipeline never leaks the previous
    /// recording's origin.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether any video sample has been accepted since the last reset.
    pub fn has_video(&self) -> bool {
        self.seen_video
    }

    /// Rebase one sample against the shared origin, establishing the origin
    /// from this sample if it is the first of the session.
    pub fn rebase(&mut self, mut sample: RawSample) -> RawSample {
        let track = sample.track();
        let native = sample.pts();

        let origin = match self.origin {
            Some(origin) => origin,
            None => {
                self.origin = Some(native);
                self.origin_track = Some(track);
                native
            }
        };

        // A sample captured before the origin-setting sample but delivered
        // after it would go negative; pin it to zero instead.
        let mut rebased = native.saturating_sub(origin).max(0);

        match track {
            Track::Video => {
                if self.seen_video {
                    rebased = rebased.max(self.last_video);
                }
                self.seen_video = true;
                self.last_video = rebased;
            }
            Track::Audio => {
                if self.seen_audio {
                    rebased = rebased.max(self.last_audio);
                }
                self.seen_audio = true;
                self.last_audio = rebased;
            }
        }

        sample.set_pts(rebased);
        sample
    }

    /// Re-arm the first-video flag after the first video sample was dropped
    /// downstream. If that frame had also established the shared origin, the
    /// origin is cleared so the next incoming sample becomes the reference.
    pub fn rearm_video(&mut self) {
        self.seen_video = false;
        self.last_video = 0;
        if self.origin_track == Some(Track::Video) && !self.seen_audio {
            self.origin = None;
            self.origin_track = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{AudioChunk, VideoFrame};

    fn video(pts: Nanos) -> RawSample {
        RawSample::Video(VideoFrame {
            data: Vec::new(),
            width: 2,
            height: 2,
            stride: 8,
            pts,
            duration: None,
        })
    }

    fn audio(pts: Nanos) -> RawSample {
        RawSample::Audio(AudioChunk {
            samples: Vec::new(),
            channels: 1,
            sample_rate: 48_000,
            pts,
        })
    }

    #[test]
    fn first_sample_sets_origin() {
        let mut norm = TimestampNormalizer::new();
        assert_eq!(norm.rebase(video(1_000_000)).pts(), 0);
        assert_eq!(norm.rebase(video(1_033_333)).pts(), 33_333);
    }

    #[test]
    fn audio_first_shares_origin_with_video() {
        let mut norm = TimestampNormalizer::new();
        assert_eq!(norm.rebase(audio(500)).pts(), 0);
        // Video started 200ns later on the same clock; offset is preserved.
        assert_eq!(norm.rebase(video(700)).pts(), 200);
        assert_eq!(norm.rebase(audio(900)).pts(), 400);
    }

    #[test]
    fn sample_older_than_origin_clamps_to_zero() {
        let mut norm = TimestampNormalizer::new();
        assert_eq!(norm.rebase(video(1_000)).pts(), 0);
        // Audio buffer captured just before the first frame, delivered after.
        assert_eq!(norm.rebase(audio(800)).pts(), 0);
    }

    #[test]
    fn per_track_timestamps_never_regress() {
        let mut norm = TimestampNormalizer::new();
        norm.rebase(video(1_000));
        assert_eq!(norm.rebase(video(3_000)).pts(), 2_000);
        // Out-of-order delivery is pinned to the previous video timestamp.
        assert_eq!(norm.rebase(video(2_500)).pts(), 2_000);
        assert_eq!(norm.rebase(video(4_000)).pts(), 3_000);
    }

    #[test]
    fn rearm_after_dropped_first_frame_resets_origin() {
        let mut norm = TimestampNormalizer::new();
        norm.rebase(video(10_000));
        norm.rearm_video();
        // The dropped frame's timestamp must not remain the reference.
        assert_eq!(norm.rebase(video(20_000)).pts(), 0);
    }

    #[test]
    fn rearm_keeps_origin_set_by_audio() {
        let mut norm = TimestampNormalizer::new();
        norm.rebase(audio(1_000));
        norm.rebase(video(1_500));
        norm.rearm_video();
        // Origin came from audio; the next video frame keeps its offset.
        assert_eq!(norm.rebase(video(2_000)).pts(), 1_000);
    }

    #[test]
    fn reset_clears_everything() {
        let mut norm = TimestampNormalizer::new();
        norm.rebase(video(5_000));
        norm.reset();
        assert_eq!(norm.rebase(video(9_000)).pts(), 0);
    }
}
