// Filesystem watcher over the output root.
//
// Reports external additions and removals of clip files so the UI can
// refresh. Paused around recordings: a timer debounce cannot distinguish
// "in-progress write of our own recording" from "user dropped a file into
// the folder", but pausing on known intervals removes the ambiguity by
// construction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc::channel, Arc};

use log::{debug, info};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::events::{EngineEvent, EventBus};
use crate::paths;

/// Pause/resume handle shared between the coordinator and the watcher
/// thread. Every `pause` on the recording hot path has a matching `resume`
/// on all exit paths, including errors.
#[derive(Clone)]
pub struct WatcherControl {
    enabled: Arc<AtomicBool>,
}

impl WatcherControl {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn pause(&self) {
        debug!("⏸️  pausing filesystem watcher");
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        debug!("▶️  resuming filesystem watcher");
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for WatcherControl {
    fn default() -> Self {
        Self::new()
    }
}

/// A running watcher. Dropping it stops observation.
pub struct FsWatcher {
    // Held for its Drop; the OS watch ends when this goes away.
    _watcher: notify::RecommendedWatcher,
    control: WatcherControl,
}

impl FsWatcher {
    pub fn control(&self) -> WatcherControl {
        self.control.clone()
    }
}

/// Watch `output_root` recursively and emit `FilesystemChanged` for
/// relevant events while the control is enabled.
pub fn watch_output_root(
    output_root: PathBuf,
    control: WatcherControl,
    bus: EventBus,
) -> notify::Result<FsWatcher> {
    info!("📁 watching output root {:?}", output_root);
    std::fs::create_dir_all(&output_root).ok();

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(&output_root, RecursiveMode::Recursive)?;

    let enabled = control.enabled.clone();
    std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            if !enabled.load(Ordering::SeqCst) {
                debug!("filesystem event during pause window, discarding: {event:?}");
                continue;
            }
            if is_relevant(&event, &output_root) {
                debug!("relevant filesystem change: {:?}", event.paths);
                bus.emit(EngineEvent::FilesystemChanged);
            }
        }
    });

    Ok(FsWatcher {
        _watcher: watcher,
        control,
    })
}

/// Only create/remove/modify of clip files, or of directories (new
/// projects), under the output root count.
fn is_relevant(event: &Event, output_root: &std::path::Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
    ) {
        return false;
    }
    event.paths.iter().any(|path| {
        if !path.starts_with(output_root) {
            return false;
        }
        paths::is_video_file(path) || path.is_dir()
    })
}
