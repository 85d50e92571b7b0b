use pushtohold_capture::CaptureError;
use thiserror::Error;

/// Errors surfaced by the recording engine.
///
/// Every variant that can reach the UI maps to a stable code via
/// [`EngineError::code`], carried in the `recording-error` event payload.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("screen recording permission denied")]
    PermissionDenied,

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("configuration rejected: {0}")]
    ConfigurationRejected(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("failed to finalize recording: {0}")]
    FinalizationFailed(String),

    #[error("failed to write timeline: {0}")]
    TimelineWriteFailed(String),

    #[error("no project selected")]
    NoProject,

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("invalid project name: {0}")]
    InvalidProjectName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("timeline data is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PermissionDenied => "PERMISSION_DENIED",
            EngineError::CaptureUnavailable(_) => "CAPTURE_UNAVAILABLE",
            EngineError::ConfigurationRejected(_) => "CONFIGURATION_REJECTED",
            EngineError::CaptureFailed(_) => "CAPTURE_ERROR",
            EngineError::FinalizationFailed(_) => "SAVE_ERROR",
            EngineError::TimelineWriteFailed(_) => "TIMELINE_WRITE_FAILED",
            EngineError::NoProject => "PROJECT_REQUIRED",
            EngineError::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            EngineError::InvalidProjectName(_) => "INVALID_PROJECT_NAME",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Json(_) => "TIMELINE_PARSE_ERROR",
        }
    }
}

impl From<CaptureError> for EngineError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => EngineError::PermissionDenied,
            CaptureError::Unavailable(msg) => EngineError::CaptureUnavailable(msg),
            CaptureError::ConfigRejected(msg) => EngineError::ConfigurationRejected(msg),
            CaptureError::Finalize(msg) => EngineError::FinalizationFailed(msg),
            other => EngineError::CaptureFailed(other.to_string()),
        }
    }
}
