// Raw sample types handed over by the platform capture backends.
//
// Timestamps are native presentation times in nanoseconds on whatever clock
// the OS capture subsystem uses. The TimestampNormalizer rebases them to a
// shared zero origin before they reach the encoder sink.

/// Native presentation timestamp in nanoseconds.
pub type Nanos = i64;

/// Which track a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Audio,
}

/// One captured screen frame, tightly packed BGRA8.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row. Backends hand over packed rows (`width * 4`) but the
    /// encoder respects this in case a platform pads.
    pub stride: usize,
    pub pts: Nanos,
    /// Display duration if the source reports one; the muxer infers it
    /// from frame spacing otherwise.
    pub duration: Option<Nanos>,
}

/// One captured microphone buffer, interleaved f32 samples.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub pts: Nanos,
}

impl AudioChunk {
    /// Number of sample frames (per-channel samples) in this chunk.
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// A sample from either track, as delivered by a capture backend.
#[derive(Debug, Clone)]
pub enum RawSample {
    Video(VideoFrame),
    Audio(AudioChunk),
}

impl RawSample {
    pub fn track(&self) -> Track {
        match self {
            RawSample::Video(_) => Track::Video,
            RawSample::Audio(_) => Track::Audio,
        }
    }

    pub fn pts(&self) -> Nanos {
        match self {
            RawSample::Video(frame) => frame.pts,
            RawSample::Audio(chunk) => chunk.pts,
        }
    }

    pub(crate) fn set_pts(&mut self, pts: Nanos) {
        match self {
            RawSample::Video(frame) => frame.pts = pts,
            RawSample::Audio(chunk) => chunk.pts = pts,
        }
    }
}
