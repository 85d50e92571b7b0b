// Timeline editing through the engine command surface: label edits,
// soft delete, undo/redo, and rename-surviving reconciliation.

use std::sync::mpsc;
use std::sync::Arc;

use pushtohold_capture::backend::synthetic::SyntheticBackend;
use pushtohold_engine::timeline::{NewRecording, Resolution, TimelineStore};
use pushtohold_engine::Engine;

fn engine() -> (Engine, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let (tx, _rx) = mpsc::channel();
    let engine = Engine::with_output_root(
        Arc::new(SyntheticBackend::new()),
        Arc::new(tx),
        root.path().to_path_buf(),
    )
    .unwrap();
    engine.create_project("demo").unwrap();
    (engine, root)
}

fn seed_clip(root: &std::path::Path, filename: &str, content: &[u8]) -> String {
    let dir = root.join("demo");
    std::fs::write(dir.join(filename), content).unwrap();
    let store = TimelineStore::new(root.to_path_buf());
    let entry = store
        .append_recording(
            "demo",
            NewRecording {
                filename: filename.to_string(),
                duration_ms: 2500,
                resolution: Resolution {
                    width: 1920,
                    height: 1080,
                },
                mic_enabled: true,
                checksum: pushtohold_engine::timeline::file_checksum(&dir.join(filename)).ok(),
            },
        )
        .unwrap();
    entry.id
}

#[test]
fn label_edit_undo_redo_round_trip() {
    let (engine, root) = engine();
    seed_clip(root.path(), "recording-1.mp4", b"take one");

    let mut edited = engine.get_project_timeline("demo").unwrap();
    edited.entries[0].label = Some("the good take".into());
    engine.save_project_timeline("demo", edited).unwrap();

    assert!(engine.undo_timeline("demo").unwrap());
    let timeline = engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries[0].label, None);

    assert!(engine.redo_timeline("demo").unwrap());
    let timeline = engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries[0].label.as_deref(), Some("the good take"));

    // Nothing further to redo.
    assert!(!engine.redo_timeline("demo").unwrap());
}

#[test]
fn soft_delete_is_undoable() {
    let (engine, root) = engine();
    let id = seed_clip(root.path(), "recording-1.mp4", b"take one");

    let mut edited = engine.get_project_timeline("demo").unwrap();
    let entry = edited.entries.iter_mut().find(|e| e.id == id).unwrap();
    entry.deleted = true;
    entry.deleted_at = Some(chrono::Utc::now().to_rfc3339());
    engine.save_project_timeline("demo", edited).unwrap();

    let timeline = engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.visible_entries().count(), 0);
    assert_eq!(timeline.entries.len(), 1, "soft delete keeps the entry");

    assert!(engine.undo_timeline("demo").unwrap());
    let timeline = engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.visible_entries().count(), 1);
}

#[test]
fn rename_on_disk_survives_reconcile_with_identity_intact() {
    let (engine, root) = engine();
    let id = seed_clip(root.path(), "recording-3.mp4", b"renameworthy bytes");

    let dir = root.path().join("demo");
    std::fs::rename(dir.join("recording-3.mp4"), dir.join("my-clip.mp4")).unwrap();

    assert_eq!(engine.reconcile_project_timeline("demo").unwrap(), 0);

    let timeline = engine.get_project_timeline("demo").unwrap();
    assert_eq!(timeline.entries.len(), 1);
    assert_eq!(timeline.entries[0].id, id);
    assert_eq!(timeline.entries[0].filename, "my-clip.mp4");
    assert_eq!(timeline.entries[0].duration_ms, 2500);
}

#[test]
fn reconcile_twice_is_stable() {
    let (engine, root) = engine();
    seed_clip(root.path(), "recording-1.mp4", b"one");
    std::fs::write(root.path().join("demo").join("import.mp4"), b"imported").unwrap();

    assert_eq!(engine.reconcile_project_timeline("demo").unwrap(), 1);
    let first = engine.get_project_timeline("demo").unwrap();

    assert_eq!(engine.reconcile_project_timeline("demo").unwrap(), 0);
    let second = engine.get_project_timeline("demo").unwrap();
    assert_eq!(first.entries.len(), second.entries.len());
    assert_eq!(first.last_modified, second.last_modified);
}

#[test]
fn undo_with_no_history_reports_false() {
    let (engine, _root) = engine();
    assert!(!engine.undo_timeline("demo").unwrap());
}
