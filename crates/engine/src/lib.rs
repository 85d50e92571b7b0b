// Push-to-hold recording core
//!
//! # pushtohold-engine
//!
//! The subsystem between a global hotkey and a saved clip: hold the key,
//! capture the screen (and optionally the microphone), release, and a
//! playable MP4 plus a timeline entry exist before the status indicator has
//! settled.
//!
//! The UI shell, hotkey registration and the OS capture frameworks are
//! external collaborators. The shell supplies an [`events::EventSink`],
//! forwards hotkey callbacks to [`Engine::handle_hotkey`], and invokes the
//! command methods on [`Engine`]; the capture frameworks hide behind
//! [`pushtohold_capture::backend::CaptureBackend`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use pushtohold_capture::backend::CaptureBackend;

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod history;
pub mod hotkey;
pub mod logging;
pub mod paths;
pub mod preinit;
pub mod state;
pub mod timeline;
pub mod watcher;

pub use error::EngineError;
pub use events::{EngineEvent, EventSink, RecordingStatus};
pub use hotkey::HotkeyEvent;
pub use pushtohold_capture::{backend, CaptureError, CaptureRegion, RecordingConfig};

use coordinator::RecordingCoordinator;
use events::EventBus;
use history::TimelineHistory;
use preinit::PreInitManager;
use state::EngineState;
use timeline::TimelineStore;
use watcher::{FsWatcher, WatcherControl};

/// The recording engine. One per process; the shell drives it from any
/// thread.
pub struct Engine {
    state: Arc<EngineState>,
    bus: EventBus,
    backend: Arc<dyn CaptureBackend>,
    preinit: PreInitManager,
    coordinator: RecordingCoordinator,
    watcher: Mutex<Option<FsWatcher>>,
    watcher_control: WatcherControl,
    histories: Mutex<HashMap<String, TimelineHistory>>,
    // Owns the idle-checker task.
    _runtime: tokio::runtime::Runtime,
}

impl Engine {
    /// Build an engine rooted at the platform-default output folder.
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        Self::with_output_root(backend, sink, paths::default_output_root())
    }

    pub fn with_output_root(
        backend: Arc<dyn CaptureBackend>,
        sink: Arc<dyn EventSink>,
        output_root: PathBuf,
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&output_root)?;

        let bus = EventBus::new(sink);
        let state = Arc::new(EngineState::new(output_root.clone()));
        let watcher_control = WatcherControl::new();

        let fs_watcher =
            watcher::watch_output_root(output_root, watcher_control.clone(), bus.clone())
                .map_err(|e| {
                    EngineError::CaptureUnavailable(format!("watch output folder: {e}"))
                })?;

        let preinit = PreInitManager::new(backend.clone(), bus.clone());
        let coordinator = RecordingCoordinator::new(
            state.clone(),
            preinit.clone(),
            watcher_control.clone(),
            bus.clone(),
            backend.clone(),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()?;
        preinit::spawn_idle_checker(&runtime, preinit.clone(), state.clone(), bus.clone());

        Ok(Self {
            state,
            bus,
            backend,
            preinit,
            coordinator,
            watcher: Mutex::new(Some(fs_watcher)),
            watcher_control,
            histories: Mutex::new(HashMap::new()),
            _runtime: runtime,
        })
    }

    /// Forward one hotkey callback from the external provider. Non-blocking.
    pub fn handle_hotkey(&self, event: HotkeyEvent) {
        self.coordinator.on_hotkey(event);
    }

    /// Whether a press has been accepted and its release not yet seen.
    pub fn is_recording(&self) -> bool {
        self.coordinator.is_recording()
    }

    /// Watcher pause/resume handle (observable by tests and the shell).
    pub fn watcher_control(&self) -> WatcherControl {
        self.watcher_control.clone()
    }

    fn store(&self) -> TimelineStore {
        TimelineStore::new(self.state.output_root())
    }

    /// Invalidate and rebuild the warm session after any capture-relevant
    /// setting changed. The list of settings safe to change without a
    /// rebuild is deliberately empty.
    fn rebuild_pre_init(&self) {
        self.preinit.touch_activity();
        if let Some(profile) = self.state.current_profile() {
            self.preinit.initialize(profile);
        }
    }
}
