// Keeps a capture session warm so a hotkey press is a single fast
// stream-start call, and tears it down when the user is clearly not about
// to record.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use pushtohold_capture::{backend::CaptureBackend, CaptureSession};
use serde::Serialize;

use crate::events::EventBus;
use crate::state::{CaptureProfile, EngineState};

/// Pre-initialization lifecycle. Transitions are monotone along
/// `NotInitialized -> Initializing -> Ready -> ShuttingDown -> NotInitialized`;
/// the transient states never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreInitStatus {
    NotInitialized,
    Initializing,
    Ready,
    ShuttingDown,
}

impl PreInitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreInitStatus::NotInitialized => "NotInitialized",
            PreInitStatus::Initializing => "Initializing",
            PreInitStatus::Ready => "Ready",
            PreInitStatus::ShuttingDown => "ShuttingDown",
        }
    }
}

struct Slot {
    status: PreInitStatus,
    session: Option<CaptureSession>,
    profile: Option<CaptureProfile>,
    /// Profile requested while a build or teardown was in flight; honored
    /// when the transient state resolves.
    queued: Option<CaptureProfile>,
    /// Bumped on every teardown; a completing build with a stale generation
    /// discards its session instead of installing it.
    generation: u64,
}

struct Inner {
    backend: Arc<dyn CaptureBackend>,
    slot: Mutex<Slot>,
    settled: Condvar,
    bus: EventBus,
    last_activity: Mutex<Instant>,
}

/// Cloneable handle to the warm-session slot.
#[derive(Clone)]
pub struct PreInitManager {
    inner: Arc<Inner>,
}

impl PreInitManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                slot: Mutex::new(Slot {
                    status: PreInitStatus::NotInitialized,
                    session: None,
                    profile: None,
                    queued: None,
                    generation: 0,
                }),
                settled: Condvar::new(),
                bus,
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn status(&self) -> PreInitStatus {
        self.inner.slot.lock().unwrap().status
    }

    /// Build and hold a warm session for `profile`.
    ///
    /// Idempotent: already `Ready` with the same profile is a no-op, an
    /// in-flight build of the same profile is left alone, and a request
    /// during teardown is queued to run afterwards. A differing profile
    /// forces teardown and rebuild.
    pub fn initialize(&self, profile: CaptureProfile) {
        let mut slot = self.inner.slot.lock().unwrap();
        match slot.status {
            PreInitStatus::Ready => {
                if slot.profile.as_ref() == Some(&profile) {
                    debug!("pre-init already ready for this configuration");
                    return;
                }
                info!("🔄 configuration changed, rebuilding warm session");
                self.teardown_locked(&mut slot);
                self.begin_build_locked(&mut slot, profile);
            }
            PreInitStatus::Initializing => {
                if slot.profile.as_ref() == Some(&profile) {
                    debug!("pre-init already in flight for this configuration");
                } else {
                    slot.queued = Some(profile);
                }
            }
            PreInitStatus::ShuttingDown => {
                slot.queued = Some(profile);
            }
            PreInitStatus::NotInitialized => {
                self.begin_build_locked(&mut slot, profile);
            }
        }
    }

    fn begin_build_locked(&self, slot: &mut Slot, profile: CaptureProfile) {
        slot.status = PreInitStatus::Initializing;
        slot.profile = Some(profile.clone());
        let generation = slot.generation;
        self.inner.bus.pre_init_status(PreInitStatus::Initializing);

        let manager = self.clone();
        std::thread::spawn(move || {
            let started = Instant::now();
            let result = manager.build_session(&profile);
            let elapsed = started.elapsed();
            manager.finish_build(generation, profile, result, elapsed);
        });
    }

    fn build_session(&self, profile: &CaptureProfile) -> Result<CaptureSession, String> {
        std::fs::create_dir_all(&profile.project_dir)
            .map_err(|e| format!("create project folder: {e}"))?;
        let mut session =
            CaptureSession::new(profile.recording_config(), self.inner.backend.clone())
                .map_err(|e| e.to_string())?;
        session.pre_initialize().map_err(|e| e.to_string())?;
        Ok(session)
    }

    fn finish_build(
        &self,
        generation: u64,
        profile: CaptureProfile,
        result: Result<CaptureSession, String>,
        elapsed: Duration,
    ) {
        let mut slot = self.inner.slot.lock().unwrap();

        if slot.generation != generation {
            debug!("discarding warm session from a superseded build");
            self.settle_locked(&mut slot, PreInitStatus::NotInitialized);
        } else {
            match result {
                Ok(session) => {
                    info!(
                        "✅ capture session pre-initialized in {:.0} ms",
                        elapsed.as_secs_f64() * 1000.0
                    );
                    slot.session = Some(session);
                    slot.profile = Some(profile);
                    self.settle_locked(&mut slot, PreInitStatus::Ready);
                }
                Err(e) => {
                    // Surface and stay down; no retry loop.
                    error!("❌ pre-initialization failed: {e}");
                    slot.session = None;
                    slot.profile = None;
                    self.settle_locked(&mut slot, PreInitStatus::NotInitialized);
                }
            }
        }

        if let Some(queued) = slot.queued.take() {
            if slot.status != PreInitStatus::Ready || slot.profile.as_ref() != Some(&queued) {
                if slot.status == PreInitStatus::Ready {
                    self.teardown_locked(&mut slot);
                }
                self.begin_build_locked(&mut slot, queued);
            }
        }
    }

    fn settle_locked(&self, slot: &mut Slot, status: PreInitStatus) {
        slot.status = status;
        self.inner.bus.pre_init_status(status);
        self.inner.settled.notify_all();
    }

    fn teardown_locked(&self, slot: &mut Slot) {
        slot.status = PreInitStatus::ShuttingDown;
        self.inner.bus.pre_init_status(PreInitStatus::ShuttingDown);
        slot.session = None;
        slot.profile = None;
        slot.generation += 1;
        self.settle_locked(slot, PreInitStatus::NotInitialized);
    }

    /// Take the warm session for recording. The slot empties; the caller is
    /// expected to kick off a fresh `initialize` once its recording ends.
    pub fn take(&self) -> Option<(CaptureSession, CaptureProfile)> {
        let mut slot = self.inner.slot.lock().unwrap();
        if slot.status != PreInitStatus::Ready {
            return None;
        }
        let session = slot.session.take()?;
        let profile = slot.profile.take()?;
        self.settle_locked(&mut slot, PreInitStatus::NotInitialized);
        Some((session, profile))
    }

    /// Tear down whatever is held or being built.
    pub fn shutdown(&self) {
        let mut slot = self.inner.slot.lock().unwrap();
        match slot.status {
            PreInitStatus::Ready => {
                info!("💤 shutting down warm capture session");
                self.teardown_locked(&mut slot);
            }
            PreInitStatus::Initializing => {
                // The in-flight build lands on a stale generation and is
                // discarded when it completes.
                slot.generation += 1;
                slot.queued = None;
                slot.profile = None;
                warn!("shutdown requested during initialization; build will be discarded");
            }
            _ => {}
        }
    }

    /// User-facing on/off switch.
    pub fn toggle(&self, profile: Option<CaptureProfile>) -> PreInitStatus {
        match self.status() {
            PreInitStatus::Ready => {
                self.shutdown();
            }
            PreInitStatus::NotInitialized => {
                if let Some(profile) = profile {
                    self.initialize(profile);
                }
            }
            _ => {}
        }
        self.status()
    }

    /// Block until no transient state is in progress, or the timeout lapses.
    pub fn wait_settled(&self, timeout: Duration) -> PreInitStatus {
        let slot = self.inner.slot.lock().unwrap();
        let (slot, _) = self
            .inner
            .settled
            .wait_timeout_while(slot, timeout, |s| {
                matches!(
                    s.status,
                    PreInitStatus::Initializing | PreInitStatus::ShuttingDown
                )
            })
            .unwrap();
        slot.status
    }

    pub fn touch_activity(&self) {
        *self.inner.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.last_activity.lock().unwrap().elapsed()
    }
}

/// Periodically release OS capture resources when the user has been idle
/// past the configured timeout. A timeout of zero disables the shutdown.
pub fn spawn_idle_checker(
    runtime: &tokio::runtime::Runtime,
    manager: PreInitManager,
    state: Arc<EngineState>,
    bus: EventBus,
) {
    runtime.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let timeout_mins = *state.idle_timeout_mins.lock().unwrap();
            if timeout_mins == 0 {
                continue;
            }
            let timeout = Duration::from_secs(timeout_mins as u64 * 60);
            if manager.status() == PreInitStatus::Ready && manager.idle_for() > timeout {
                info!("💤 idle for {timeout_mins} min, releasing capture resources");
                bus.emit(crate::events::EngineEvent::PreInitIdleShutdown);
                manager.shutdown();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EngineEvent;
    use pushtohold_capture::backend::synthetic::SyntheticBackend;
    use std::sync::mpsc;

    fn manager_with(backend: SyntheticBackend) -> (PreInitManager, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        let bus = EventBus::new(Arc::new(tx));
        (PreInitManager::new(Arc::new(backend), bus), rx)
    }

    fn profile(root: &std::path::Path, mic: bool) -> CaptureProfile {
        CaptureProfile {
            project_name: "demo".into(),
            project_dir: root.join("demo"),
            mic_enabled: mic,
            microphone_device_id: None,
            region: None,
            display_id: None,
        }
    }

    #[test]
    fn initialize_reaches_ready() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) = manager_with(SyntheticBackend::new());

        manager.initialize(profile(root.path(), false));
        assert_eq!(
            manager.wait_settled(Duration::from_secs(5)),
            PreInitStatus::Ready
        );
    }

    #[test]
    fn initialize_is_idempotent_when_ready() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) = manager_with(SyntheticBackend::new());
        let p = profile(root.path(), false);

        manager.initialize(p.clone());
        manager.wait_settled(Duration::from_secs(5));
        manager.initialize(p);
        assert_eq!(manager.status(), PreInitStatus::Ready);
    }

    #[test]
    fn take_empties_the_slot() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) = manager_with(SyntheticBackend::new());

        manager.initialize(profile(root.path(), false));
        manager.wait_settled(Duration::from_secs(5));

        let taken = manager.take();
        assert!(taken.is_some());
        assert_eq!(manager.status(), PreInitStatus::NotInitialized);
        assert!(manager.take().is_none());
    }

    #[test]
    fn changed_profile_forces_rebuild() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) = manager_with(SyntheticBackend::new());

        manager.initialize(profile(root.path(), false));
        manager.wait_settled(Duration::from_secs(5));

        manager.initialize(profile(root.path(), true));
        assert_eq!(
            manager.wait_settled(Duration::from_secs(5)),
            PreInitStatus::Ready
        );
        let (session, rebuilt) = manager.take().unwrap();
        assert!(rebuilt.mic_enabled);
        assert!(session.mic_active());
    }

    #[test]
    fn shutdown_during_build_discards_the_session() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) =
            manager_with(SyntheticBackend::with_init_delay(Duration::from_millis(150)));

        manager.initialize(profile(root.path(), false));
        manager.shutdown();

        assert_eq!(
            manager.wait_settled(Duration::from_secs(5)),
            PreInitStatus::NotInitialized
        );
        assert!(manager.take().is_none());
    }

    #[test]
    fn toggle_flips_between_off_and_ready() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _rx) = manager_with(SyntheticBackend::new());
        let p = profile(root.path(), false);

        manager.toggle(Some(p.clone()));
        manager.wait_settled(Duration::from_secs(5));
        assert_eq!(manager.status(), PreInitStatus::Ready);

        manager.toggle(Some(p));
        assert_eq!(manager.status(), PreInitStatus::NotInitialized);
    }
}
