// End-to-end press/release scenarios against the synthetic capture backend.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pushtohold_capture::backend::synthetic::SyntheticBackend;
use pushtohold_engine::events::EngineEvent;
use pushtohold_engine::preinit::PreInitStatus;
use pushtohold_engine::{Engine, HotkeyEvent, RecordingStatus};

struct Rig {
    engine: Engine,
    events: Receiver<EngineEvent>,
    /// Everything received so far, so waiting for one event does not lose
    /// the ones around it.
    seen: std::cell::RefCell<Vec<EngineEvent>>,
    root: tempfile::TempDir,
}

impl Rig {
    fn new() -> Self {
        Self::with_backend(SyntheticBackend::new())
    }

    fn with_backend(backend: SyntheticBackend) -> Self {
        let root = tempfile::tempdir().unwrap();
        let (tx, events) = mpsc::channel();
        let engine = Engine::with_output_root(
            Arc::new(backend),
            Arc::new(tx),
            root.path().to_path_buf(),
        )
        .unwrap();
        engine.create_project("demo").unwrap();
        Self {
            engine,
            events,
            seen: std::cell::RefCell::new(Vec::new()),
            root,
        }
    }

    fn project_dir(&self) -> std::path::PathBuf {
        self.root.path().join("demo")
    }

    fn wait_pre_init_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.engine.get_pre_init_status() != PreInitStatus::Ready {
            assert!(Instant::now() < deadline, "pre-init never became ready");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn wait_clip_saved(&self) -> (String, u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(EngineEvent::ClipSaved(payload)) => {
                    self.seen
                        .borrow_mut()
                        .push(EngineEvent::ClipSaved(payload.clone()));
                    return (payload.path, payload.duration_ms);
                }
                Ok(other) => self.seen.borrow_mut().push(other),
                Err(_) => panic!("no ClipSaved within the deadline"),
            }
        }
    }

    fn statuses(&self) -> Vec<RecordingStatus> {
        let mut seen = self.seen.borrow_mut();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen.iter()
            .filter_map(|event| match event {
                EngineEvent::RecordingStatus(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn record_once(&self, hold: Duration) -> (String, u64) {
        self.engine.handle_hotkey(HotkeyEvent::Pressed);
        std::thread::sleep(hold);
        self.engine.handle_hotkey(HotkeyEvent::Released);
        self.wait_clip_saved()
    }
}

#[test]
fn short_recording_produces_file_and_timeline_entry() {
    let rig = Rig::new();
    rig.wait_pre_init_ready();

    let (path, duration_ms) = rig.record_once(Duration::from_millis(300));

    assert!(path.ends_with("recording-1.mp4"));
    assert!(rig.project_dir().join("recording-1.mp4").exists());
    assert!(
        (250..=700).contains(&duration_ms),
        "duration {duration_ms}ms out of range"
    );

    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 1);
    assert_eq!(timeline.entries[0].filename, "recording-1.mp4");
    assert_eq!(timeline.entries[0].duration_ms, duration_ms);
    assert!(timeline.entries[0].checksum.is_some());

    // The watcher is back on once the clip is saved.
    assert!(rig.engine.watcher_control().is_enabled());
}

#[test]
fn watcher_is_paused_while_recording() {
    let rig = Rig::new();
    rig.wait_pre_init_ready();

    rig.engine.handle_hotkey(HotkeyEvent::Pressed);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!rig.engine.watcher_control().is_enabled());

    rig.engine.handle_hotkey(HotkeyEvent::Released);
    rig.wait_clip_saved();
    assert!(rig.engine.watcher_control().is_enabled());
}

#[test]
fn rapid_represses_yield_distinct_sequential_files() {
    let rig = Rig::new();
    rig.wait_pre_init_ready();

    // Two clips already on disk; numbering continues after them.
    std::fs::write(rig.project_dir().join("recording-1.mp4"), b"one").unwrap();
    std::fs::write(rig.project_dir().join("recording-2.mp4"), b"two").unwrap();

    let mut saved = Vec::new();
    for _ in 0..3 {
        saved.push(rig.record_once(Duration::from_millis(200)).0);
        std::thread::sleep(Duration::from_millis(100));
    }

    assert!(saved[0].ends_with("recording-3.mp4"));
    assert!(saved[1].ends_with("recording-4.mp4"));
    assert!(saved[2].ends_with("recording-5.mp4"));

    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 3, "no duplicate entries");

    let statuses = rig.statuses();
    let transitions: Vec<_> = statuses
        .iter()
        .filter(|s| matches!(s, RecordingStatus::Recording | RecordingStatus::Idle))
        .collect();
    assert_eq!(transitions.len(), 6, "three Recording/Idle pairs: {statuses:?}");
    for pair in transitions.chunks(2) {
        assert_eq!(*pair[0], RecordingStatus::Recording);
        assert_eq!(*pair[1], RecordingStatus::Idle);
    }
}

#[test]
fn auto_repeat_presses_create_one_recording() {
    let rig = Rig::new();
    rig.wait_pre_init_ready();

    let first_press = Instant::now();
    for _ in 0..20 {
        rig.engine.handle_hotkey(HotkeyEvent::Pressed);
        std::thread::sleep(Duration::from_millis(15));
    }
    rig.engine.handle_hotkey(HotkeyEvent::Released);
    let held = first_press.elapsed();

    let (path, duration_ms) = rig.wait_clip_saved();
    assert!(path.ends_with("recording-1.mp4"));

    // Duration tracks the full wall clock from the first accepted press.
    let held_ms = held.as_millis() as u64;
    assert!(
        duration_ms + 150 >= held_ms,
        "duration {duration_ms}ms too short for {held_ms}ms hold"
    );

    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 1);

    let recordings: Vec<_> = std::fs::read_dir(rig.project_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".mp4"))
        .collect();
    assert_eq!(recordings.len(), 1);
}

#[test]
fn release_during_cold_start_still_records_once() {
    let rig = Rig::with_backend(SyntheticBackend::with_init_delay(Duration::from_millis(200)));
    // Deliberately no warm session: shut pre-init down and record cold.
    rig.wait_pre_init_ready();
    rig.engine.toggle_pre_init();

    rig.engine.handle_hotkey(HotkeyEvent::Pressed);
    // Release lands while the on-demand build is still in flight.
    std::thread::sleep(Duration::from_millis(50));
    rig.engine.handle_hotkey(HotkeyEvent::Released);

    let (path, _) = rig.wait_clip_saved();
    assert!(path.ends_with("recording-1.mp4"));

    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 1);
    assert!(rig.engine.watcher_control().is_enabled());
}

#[test]
fn external_drop_during_recording_is_deferred_to_reconcile() {
    let rig = Rig::new();
    rig.wait_pre_init_ready();

    rig.engine.handle_hotkey(HotkeyEvent::Pressed);
    std::thread::sleep(Duration::from_millis(100));
    std::fs::write(rig.project_dir().join("dropped.mp4"), b"external").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    rig.engine.handle_hotkey(HotkeyEvent::Released);
    rig.wait_clip_saved();

    // Only the recording made it into the timeline.
    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 1);
    assert_eq!(timeline.entries[0].filename, "recording-1.mp4");

    // The dropped file surfaces on the next reconcile.
    let promoted = rig.engine.reconcile_project_timeline("demo").unwrap();
    assert_eq!(promoted, 1);
    let timeline = rig.engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 2);
}

#[test]
fn recording_without_a_project_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let (tx, events) = mpsc::channel();
    let engine = Engine::with_output_root(
        Arc::new(SyntheticBackend::new()),
        Arc::new(tx),
        root.path().to_path_buf(),
    )
    .unwrap();

    engine.handle_hotkey(HotkeyEvent::Pressed);

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut saw_project_required = false;
    while Instant::now() < deadline && !saw_project_required {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
            saw_project_required = matches!(event, EngineEvent::ProjectRequired);
        }
    }
    assert!(saw_project_required);
    assert!(!engine.is_recording());
    assert!(engine.watcher_control().is_enabled());
}
