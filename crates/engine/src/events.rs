// Events flowing from the engine to the UI shell.
//
// The shell is an external collaborator: it supplies an `EventSink` and
// renders whatever arrives. Status events for one recording are emitted in
// order (`Recording` then `Idle`); `ClipSaved` is a file notification that
// may legitimately arrive after the next recording's `Recording`.

use serde::Serialize;

use crate::error::EngineError;
use crate::preinit::PreInitStatus;

/// Status indicator shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Saving,
    Error,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Idle => "idle",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Saving => "saving",
            RecordingStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClipSavedPayload {
    pub path: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSelectorPayload {
    pub open: bool,
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: String,
    #[serde(rename = "scaleToPreset")]
    pub scale_to_preset: bool,
}

/// Everything the engine can tell the shell.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RecordingStatus(RecordingStatus),
    ClipSaved(ClipSavedPayload),
    RecordingError(ErrorPayload),
    FilesystemChanged,
    PreInitStatus(PreInitStatus),
    PreInitIdleShutdown,
    ProjectRequired,
    RegionSelector(RegionSelectorPayload),
}

/// Receiver for engine events; the UI shell implements this.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

impl EventSink for std::sync::mpsc::Sender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        // A closed receiver means the shell is gone; nothing to do.
        let _ = self.send(event);
    }
}

/// Cloneable handle the engine components emit through.
#[derive(Clone)]
pub struct EventBus {
    sink: std::sync::Arc<dyn EventSink>,
}

impl EventBus {
    pub fn new(sink: std::sync::Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: EngineEvent) {
        self.sink.emit(event);
    }

    pub fn status(&self, status: RecordingStatus) {
        self.emit(EngineEvent::RecordingStatus(status));
    }

    pub fn clip_saved(&self, path: String, duration_ms: u64) {
        self.emit(EngineEvent::ClipSaved(ClipSavedPayload { path, duration_ms }));
    }

    pub fn error(&self, err: &EngineError) {
        self.emit(EngineEvent::RecordingError(ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        }));
    }

    pub fn pre_init_status(&self, status: PreInitStatus) {
        self.emit(EngineEvent::PreInitStatus(status));
    }
}
