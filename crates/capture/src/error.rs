use thiserror::Error;

/// Errors surfaced by the capture pipeline.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("screen recording permission denied")]
    PermissionDenied,

    #[error("capture unavailable: {0}")]
    Unavailable(String),

    #[error("encoder rejected configuration: {0}")]
    ConfigRejected(String),

    #[error("capture stream error: {0}")]
    Stream(String),

    #[error("failed to finalize recording: {0}")]
    Finalize(String),

    #[error("session is not pre-initialized")]
    NotReady,

    #[error("session is already recording")]
    AlreadyRecording,

    #[error("session is not recording")]
    NotRecording,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        CaptureError::Unavailable(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        CaptureError::Stream(msg.into())
    }
}
