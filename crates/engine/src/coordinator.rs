// Turns hotkey press/release into correct, race-free recordings.
//
// A single atomic flag guards entry: the press handler CASes it false->true,
// the release handler the inverse, and a failed swap drops the event. OS key
// auto-repeat and rapid re-press sequences debounce for free. Status events
// are emitted synchronously in the handlers; everything slow runs on one
// worker thread, so a release that arrives while start is still in flight
// queues behind it and stops the recording as soon as start completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use log::{debug, error, info, warn};
use pushtohold_capture::backend::CaptureBackend;
use pushtohold_capture::CaptureSession;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, RecordingStatus};
use crate::hotkey::HotkeyEvent;
use crate::paths;
use crate::preinit::PreInitManager;
use crate::state::{CaptureProfile, EngineState};
use crate::timeline::{self, NewRecording, Resolution, TimelineStore};
use crate::watcher::WatcherControl;

/// Start latency above this is reported with an apology: the user held the
/// key expecting capture, and the first part of their intent is missing.
pub const SLOW_START_THRESHOLD_MS: u128 = 250;

enum Job {
    Start { pressed_at: Instant },
    Stop,
}

struct ActiveRecording {
    session: CaptureSession,
    profile: CaptureProfile,
}

struct Inner {
    state: Arc<EngineState>,
    preinit: PreInitManager,
    watcher: WatcherControl,
    bus: EventBus,
    backend: Arc<dyn CaptureBackend>,
    is_recording: AtomicBool,
    active: Mutex<Option<ActiveRecording>>,
}

/// Cloneable handle; the hotkey callback owns one and hands work off to the
/// coordinator's worker thread without blocking.
#[derive(Clone)]
pub struct RecordingCoordinator {
    inner: Arc<Inner>,
    jobs: mpsc::Sender<Job>,
}

impl RecordingCoordinator {
    pub fn new(
        state: Arc<EngineState>,
        preinit: PreInitManager,
        watcher: WatcherControl,
        bus: EventBus,
        backend: Arc<dyn CaptureBackend>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state,
            preinit,
            watcher,
            bus,
            backend,
            is_recording: AtomicBool::new(false),
            active: Mutex::new(None),
        });

        let (jobs, job_rx) = mpsc::channel::<Job>();
        let worker = inner.clone();
        std::thread::spawn(move || {
            for job in job_rx {
                match job {
                    Job::Start { pressed_at } => worker.run_start(pressed_at),
                    Job::Stop => worker.run_stop(),
                }
            }
        });

        Self { inner, jobs }
    }

    /// Whether a recording is currently claimed (press accepted, release
    /// not yet seen).
    pub fn is_recording(&self) -> bool {
        self.inner.is_recording.load(Ordering::SeqCst)
    }

    /// Entry point for the external hotkey provider. Runs on the provider's
    /// thread; must never block.
    pub fn on_hotkey(&self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::Pressed => {
                if self
                    .inner
                    .is_recording
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!("press while already recording (auto-repeat), dropping");
                    return;
                }
                // Straight to "recording", no intermediate state: anything
                // emitted later can arrive after the next press's event and
                // pin the UI to a stale status.
                self.inner.bus.status(RecordingStatus::Recording);
                let _ = self.jobs.send(Job::Start {
                    pressed_at: Instant::now(),
                });
            }
            HotkeyEvent::Released => {
                if self
                    .inner
                    .is_recording
                    .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!("release without a recording, dropping");
                    return;
                }
                // Idle is emitted before finalization completes, for the
                // same stale-status reason; ClipSaved follows when the file
                // is durable.
                self.inner.bus.status(RecordingStatus::Idle);
                let _ = self.jobs.send(Job::Stop);
            }
        }
    }
}

impl Inner {
    fn run_start(&self, pressed_at: Instant) {
        self.watcher.pause();

        let Some(project_name) = self.state.current_project() else {
            warn!("recording attempted with no active project");
            self.is_recording.store(false, Ordering::SeqCst);
            self.watcher.resume();
            self.bus.emit(EngineEvent::ProjectRequired);
            self.bus.status(RecordingStatus::Idle);
            return;
        };

        let profile = self.state.capture_profile(&project_name);
        if let Err(e) = std::fs::create_dir_all(&profile.project_dir) {
            self.fail_start(EngineError::Io(e));
            return;
        }

        let mut session = match self.claim_session(&profile, pressed_at) {
            Ok(session) => session,
            Err(e) => {
                self.fail_start(e);
                return;
            }
        };

        let output_path = match paths::next_recording_path(&profile.project_dir) {
            Ok(path) => path,
            Err(e) => {
                self.fail_start(EngineError::Io(e));
                return;
            }
        };

        if let Err(e) = session.start(output_path.clone()) {
            self.fail_start(e.into());
            return;
        }

        let latency = pressed_at.elapsed();
        info!(
            "✅ recording started into {:?} ({} ms after press)",
            output_path,
            latency.as_millis()
        );
        if latency.as_millis() > SLOW_START_THRESHOLD_MS {
            warn!(
                "💔 slow start: {} ms from press to capture. We sincerely apologize - \
                 the first {} ms of this take were not recorded.",
                latency.as_millis(),
                latency.as_millis()
            );
        }

        self.preinit.touch_activity();
        *self.active.lock().unwrap() = Some(ActiveRecording { session, profile });
    }

    /// Fast path: the warm session, if its configuration still matches.
    /// Slow path: build one on demand and own up to the delay.
    fn claim_session(
        &self,
        profile: &CaptureProfile,
        pressed_at: Instant,
    ) -> Result<CaptureSession, EngineError> {
        match self.preinit.take() {
            Some((session, held_profile)) if held_profile == *profile => {
                debug!("⚡ using pre-initialized capture session");
                return Ok(session);
            }
            Some(_) => {
                // Held session was built for another configuration; it is
                // torn down by the drop and we pay the cold path.
                warn!("warm session does not match current settings, rebuilding");
            }
            None => {
                warn!("💤 no warm capture session at press time");
            }
        }

        let mut session =
            CaptureSession::new(profile.recording_config(), self.backend.clone())?;
        session.pre_initialize()?;

        let delay = pressed_at.elapsed();
        warn!(
            "💔 cold start: capture pipeline built on demand in {} ms. We sincerely \
             apologize - the first {} ms of this take were not recorded.",
            delay.as_millis(),
            delay.as_millis()
        );
        Ok(session)
    }

    fn fail_start(&self, err: EngineError) {
        error!("❌ failed to start recording: {err}");
        self.bus.error(&err);
        self.is_recording.store(false, Ordering::SeqCst);
        self.bus.status(RecordingStatus::Error);
        self.watcher.resume();
    }

    fn run_stop(&self) {
        let active = self.active.lock().unwrap().take();
        let Some(ActiveRecording {
            mut session,
            profile,
        }) = active
        else {
            warn!("release with no active recording (start failed or never ran)");
            self.watcher.resume();
            return;
        };

        match session.stop() {
            Ok((path, duration)) => {
                let duration_ms = duration.as_millis() as u64;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "recording.mp4".to_string());
                let checksum = match timeline::file_checksum(&path) {
                    Ok(sum) => Some(sum),
                    Err(e) => {
                        warn!("could not checksum {filename}: {e}");
                        None
                    }
                };

                let store = TimelineStore::new(self.state.output_root());
                let recording = NewRecording {
                    filename,
                    duration_ms,
                    resolution: Resolution {
                        width: session.config().width,
                        height: session.config().height,
                    },
                    mic_enabled: session.mic_active(),
                    checksum,
                };
                if let Err(e) = store.append_recording(&profile.project_name, recording) {
                    // The file is on disk but orphaned; the next reconcile
                    // promotes it.
                    error!("timeline write failed: {e}");
                    self.bus.error(&e);
                }

                self.bus
                    .clip_saved(path.to_string_lossy().to_string(), duration_ms);

                // Only now may the watcher look again; it must not observe
                // the in-progress file and double-report it.
                self.watcher.resume();

                if let Some(profile) = self.state.current_profile() {
                    self.preinit.initialize(profile);
                }
            }
            Err(e) => {
                let err: EngineError = e.into();
                error!("❌ failed to finalize recording: {err}");
                self.bus.error(&err);
                self.bus.status(RecordingStatus::Error);
                self.watcher.resume();
            }
        }
    }
}
