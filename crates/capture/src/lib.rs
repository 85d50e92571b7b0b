// Native push-to-hold screen capture pipeline
//!
//! # pushtohold-capture
//!
//! Turns raw OS capture samples into a self-contained H.264/AAC MP4 with
//! minimal start latency:
//! - macOS: ScreenCaptureKit + AVFoundation microphone capture
//! - encoding: streaming H.264 (hardware where available) + AAC via FFmpeg
//!
//! ## Design
//! - Expensive pipeline setup happens in `CaptureSession::pre_initialize`,
//!   off the hot path; `start` is a single fast stream-start call.
//! - Samples stream straight into the encoder. No frame buffering, bounded
//!   memory, encoding runs concurrently with capture.
//! - Video and audio timestamps are rebased to one shared origin so the
//!   written file starts at t=0 with both tracks aligned.
//!
//! ## Example
//! ```no_run
//! use pushtohold_capture::{backend, CaptureSession, RecordingConfig};
//!
//! let backend = backend::platform()?;
//! let config = RecordingConfig {
//!     output_path: "recording.mp4".into(),
//!     fps: 30,
//!     capture_microphone: true,
//!     ..Default::default()
//! };
//!
//! let mut session = CaptureSession::new(config, backend)?;
//! session.pre_initialize()?;          // slow, done ahead of user intent
//! session.start("recording.mp4".into())?; // fast
//! // ... hold ...
//! let (path, duration) = session.stop()?;
//! # Ok::<(), pushtohold_capture::CaptureError>(())
//! ```

use std::path::PathBuf;

pub mod backend;
mod clock;
mod error;
mod sample;
mod session;
mod sink;

pub use clock::TimestampNormalizer;
pub use error::CaptureError;
pub use sample::{AudioChunk, Nanos, RawSample, Track, VideoFrame};
pub use session::{CaptureSession, SessionState};
pub use sink::{EncoderSink, MediaSink};

/// Configuration for one recording generation.
///
/// Immutable once a session is built from it; any change that affects the
/// capture pipeline requires tearing the session down and building a new one.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Output MP4 file path
    pub output_path: PathBuf,

    /// Encoded frame width in pixels
    pub width: u32,

    /// Encoded frame height in pixels
    pub height: u32,

    /// Frames per second (default: 30)
    pub fps: u32,

    /// Video quality hint 0-100 (default: 80). Not a bitrate; see
    /// [`RecordingConfig::bitrate`].
    pub quality: u32,

    /// Capture mouse cursor (default: true)
    pub capture_cursor: bool,

    /// Capture microphone audio (default: false)
    pub capture_microphone: bool,

    /// Microphone device unique ID (None = prefer built-in, fall back to default)
    pub microphone_device_id: Option<String>,

    /// Display ID to capture (None = primary display)
    pub display_id: Option<u32>,

    /// Capture region (None = full display)
    pub region: Option<CaptureRegion>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("recording.mp4"),
            width: 1920,
            height: 1080,
            fps: 30,
            quality: 80,
            capture_cursor: true,
            capture_microphone: false,
            microphone_device_id: None,
            display_id: None,
            region: None,
        }
    }
}

impl RecordingConfig {
    /// Validate the dimensional invariants before a session is built.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.fps == 0 {
            return Err(CaptureError::ConfigRejected("fps must be > 0".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::ConfigRejected(
                "frame dimensions must be > 0".into(),
            ));
        }
        if let Some(region) = &self.region {
            if region.width == 0 || region.height == 0 {
                return Err(CaptureError::ConfigRejected(
                    "capture region must have a non-zero size".into(),
                ));
            }
        }
        Ok(())
    }

    /// Target bitrate in bits per second.
    ///
    /// `width * height * 3 * fps / 4`, scaled by the quality hint so the
    /// default quality of 80 reproduces the base formula. With a modern
    /// hardware encoder this is a ceiling hint, not the achieved rate.
    pub fn bitrate(&self) -> u64 {
        let base = self.width as u64 * self.height as u64 * 3 * self.fps as u64 / 4;
        base * self.quality as u64 / 80
    }

    /// Keyframe interval in frames: one keyframe every two seconds.
    pub fn keyframe_interval(&self) -> u32 {
        self.fps * 2
    }
}

/// Screen region to capture, in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
