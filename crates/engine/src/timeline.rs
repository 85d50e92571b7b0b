// Per-project timeline: an append-only, soft-delete, checksum-tracked JSON
// record of captured clips, reconciled against the files actually on disk.
//
// Filename is an unstable identity (users rename clips); the content
// checksum is the stable one. Reconcile matches by filename first and falls
// back to checksum to survive renames.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::paths::{self, TIMELINE_FILENAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(rename = "recordedAt", alias = "recorded_at")]
    pub recorded_at: String,
    #[serde(rename = "durationMs", alias = "duration_ms")]
    pub duration_ms: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(
        rename = "deletedAt",
        alias = "deleted_at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<String>,
    #[serde(rename = "aspectRatio", alias = "aspect_ratio")]
    pub aspect_ratio: String,
    pub resolution: Resolution,
    #[serde(rename = "micEnabled", alias = "mic_enabled")]
    pub mic_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineMetadata {
    #[serde(rename = "totalVideos", alias = "total_videos")]
    pub total_videos: u32,
    #[serde(rename = "totalDuration", alias = "total_duration")]
    pub total_duration: u64,
    #[serde(
        rename = "defaultAspectRatio",
        alias = "default_aspect_ratio",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTimeline {
    #[serde(rename = "projectName", alias = "project_name")]
    pub project_name: String,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: String,
    #[serde(rename = "lastModified", alias = "last_modified")]
    pub last_modified: String,
    pub entries: Vec<TimelineEntry>,
    pub metadata: TimelineMetadata,
}

impl ProjectTimeline {
    pub fn new(project_name: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            project_name: project_name.to_string(),
            created_at: now.clone(),
            last_modified: now,
            entries: Vec::new(),
            metadata: TimelineMetadata::default(),
        }
    }

    /// Entries hidden from normal views stay in the file; this yields the
    /// visible ones.
    pub fn visible_entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter().filter(|e| !e.deleted)
    }

    /// Refresh `last_modified` and the aggregate counters.
    pub fn touch(&mut self) {
        self.last_modified = chrono::Utc::now().to_rfc3339();
        self.metadata.total_videos = self.visible_entries().count() as u32;
        self.metadata.total_duration = self.visible_entries().map(|e| e.duration_ms).sum();
    }
}

/// What the coordinator knows about a just-finished recording.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub filename: String,
    pub duration_ms: u64,
    pub resolution: Resolution,
    pub mic_enabled: bool,
    pub checksum: Option<String>,
}

/// Durable per-project clip record rooted at the output folder.
pub struct TimelineStore {
    root: PathBuf,
}

impl TimelineStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn set_root(&mut self, root: PathBuf) {
        self.root = root;
    }

    fn project_dir(&self, project_name: &str) -> PathBuf {
        paths::project_dir(&self.root, project_name)
    }

    /// Read a project's timeline, or a fresh one if none exists yet.
    pub fn load(&self, project_name: &str) -> Result<ProjectTimeline, EngineError> {
        let path = paths::timeline_path(&self.project_dir(project_name));
        if !path.exists() {
            return Ok(ProjectTimeline::new(project_name));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist a timeline. Serialized to a temporary file in the same
    /// directory and renamed over the destination, so readers observe
    /// either the old or the new state and never a torn write.
    pub fn save(
        &self,
        project_name: &str,
        timeline: &mut ProjectTimeline,
    ) -> Result<(), EngineError> {
        timeline.touch();
        let dir = self.project_dir(project_name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::TimelineWriteFailed(e.to_string()))?;

        let json = serde_json::to_string_pretty(timeline)
            .map_err(|e| EngineError::TimelineWriteFailed(e.to_string()))?;

        let final_path = dir.join(TIMELINE_FILENAME);
        let tmp_path = dir.join(format!("{TIMELINE_FILENAME}.tmp"));
        std::fs::write(&tmp_path, json)
            .map_err(|e| EngineError::TimelineWriteFailed(e.to_string()))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| EngineError::TimelineWriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Append the entry for a completed recording. Insertion order is the
    /// durable order; readers sort for presentation.
    pub fn append_recording(
        &self,
        project_name: &str,
        recording: NewRecording,
    ) -> Result<TimelineEntry, EngineError> {
        let mut timeline = self.load(project_name)?;

        let entry = TimelineEntry {
            id: uuid::Uuid::new_v4().to_string(),
            filename: recording.filename,
            label: None,
            thumbnail: None,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: recording.duration_ms,
            deleted: false,
            deleted_at: None,
            aspect_ratio: aspect_ratio_for(
                recording.resolution.width,
                recording.resolution.height,
            )
            .to_string(),
            resolution: recording.resolution,
            mic_enabled: recording.mic_enabled,
            checksum: recording.checksum,
        };

        timeline.entries.push(entry.clone());
        self.save(project_name, &mut timeline)?;
        Ok(entry)
    }

    /// Mark an entry deleted without removing it, preserving undo and the
    /// audit trail. Returns whether the entry was found.
    pub fn soft_delete(&self, project_name: &str, entry_id: &str) -> Result<bool, EngineError> {
        let mut timeline = self.load(project_name)?;
        let Some(entry) = timeline.entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(false);
        };
        entry.deleted = true;
        entry.deleted_at = Some(chrono::Utc::now().to_rfc3339());
        self.save(project_name, &mut timeline)?;
        Ok(true)
    }

    /// Cross-check the timeline against the files actually present.
    ///
    /// Files match entries by filename first; leftover files match missing
    /// entries by checksum (rename detection, identity preserved); files
    /// with no match become new entries. Entries whose file is gone stay in
    /// the JSON so a restored file can reattach later. Returns the number
    /// of newly promoted entries.
    pub fn reconcile(&self, project_name: &str) -> Result<u32, EngineError> {
        let dir = self.project_dir(project_name);
        if !dir.exists() {
            return Err(EngineError::ProjectNotFound(project_name.to_string()));
        }

        let mut timeline = self.load(project_name)?;
        let on_disk = scan_video_files(&dir)?;
        let mut dirty = false;

        // Rename detection: an entry whose file is gone reattaches to the
        // file carrying its checksum, unless some entry already claims that
        // filename.
        let claimed: HashSet<String> =
            timeline.entries.iter().map(|e| e.filename.clone()).collect();
        for entry in timeline.entries.iter_mut() {
            if on_disk.contains_key(&entry.filename) {
                continue;
            }
            let Some(checksum) = entry.checksum.clone() else {
                continue;
            };
            let rename_target = on_disk
                .iter()
                .find(|(name, sum)| **sum == checksum && !claimed.contains(*name));
            if let Some((new_name, _)) = rename_target {
                info!("clip renamed on disk: {} -> {}", entry.filename, new_name);
                entry.filename = new_name.clone();
                dirty = true;
            }
        }

        // Refresh checksums for files we can see.
        for entry in timeline.entries.iter_mut() {
            if let Some(sum) = on_disk.get(&entry.filename) {
                if entry.checksum.as_ref() != Some(sum) {
                    entry.checksum = Some(sum.clone());
                    dirty = true;
                }
            }
        }

        // Promote orphans: files nobody references become entries.
        let referenced: HashSet<&str> = timeline
            .entries
            .iter()
            .map(|e| e.filename.as_str())
            .collect();
        let mut promoted = 0u32;
        let mut orphans: Vec<(&String, &String)> = on_disk
            .iter()
            .filter(|(name, _)| !referenced.contains(name.as_str()))
            .collect();
        orphans.sort_by(|a, b| a.0.cmp(b.0));

        for (filename, checksum) in orphans {
            let file_path = dir.join(filename);
            let duration_ms = probe_duration_ms(&file_path)
                .unwrap_or_else(|| estimate_duration_ms(&file_path));
            info!("promoting external clip into timeline: {filename}");
            timeline.entries.push(TimelineEntry {
                id: uuid::Uuid::new_v4().to_string(),
                filename: filename.clone(),
                label: Some("Added during timeline reconciliation".to_string()),
                thumbnail: None,
                recorded_at: file_created_rfc3339(&file_path),
                duration_ms,
                deleted: false,
                deleted_at: None,
                aspect_ratio: "none".to_string(),
                resolution: Resolution {
                    width: 0,
                    height: 0,
                },
                mic_enabled: false,
                checksum: Some(checksum.clone()),
            });
            promoted += 1;
        }
        dirty |= promoted > 0;

        // Writing an unchanged timeline would wake the filesystem watcher
        // for nothing.
        if dirty {
            self.save(project_name, &mut timeline)?;
            debug!("reconcile: {promoted} promoted, timeline rewritten");
        } else {
            debug!("reconcile: timeline already consistent");
        }
        Ok(promoted)
    }
}

/// Scan a project directory for clip files and checksum each one.
fn scan_video_files(dir: &Path) -> Result<HashMap<String, String>, EngineError> {
    let mut files = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !paths::is_video_file(&path) {
            continue;
        }
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        match file_checksum(&path) {
            Ok(sum) => {
                files.insert(filename, sum);
            }
            Err(e) => warn!("could not checksum {filename}: {e}"),
        }
    }
    Ok(files)
}

/// SHA-256 of a file's contents, streamed in 8 KiB reads.
pub fn file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// "16:9", "9:16" or "none".
pub fn aspect_ratio_for(width: u32, height: u32) -> &'static str {
    if width == 0 || height == 0 {
        "none"
    } else if width * 9 == height * 16 {
        "16:9"
    } else if width * 16 == height * 9 {
        "9:16"
    } else {
        "none"
    }
}

fn file_created_rfc3339(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| chrono::DateTime::<chrono::Utc>::from_timestamp(d.as_secs() as i64, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339())
}

/// Ask ffprobe for the real duration; absent or failing, None.
fn probe_duration_ms(path: &Path) -> Option<u64> {
    let output = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let seconds: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
    Some((seconds * 1000.0) as u64)
}

/// Rough duration from file size (~1 MiB per second of screen recording).
fn estimate_duration_ms(path: &Path) -> u64 {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    (size / (1024 * 1024)).max(1) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> TimelineStore {
        TimelineStore::new(root.to_path_buf())
    }

    fn add_clip(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn recording(filename: &str) -> NewRecording {
        NewRecording {
            filename: filename.to_string(),
            duration_ms: 3000,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            mic_enabled: true,
            checksum: None,
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        std::fs::create_dir_all(root.path().join("demo")).unwrap();

        let entry = store.append_recording("demo", recording("recording-1.mp4")).unwrap();
        let timeline = store.load("demo").unwrap();
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].id, entry.id);
        assert_eq!(timeline.entries[0].aspect_ratio, "16:9");
        assert_eq!(timeline.metadata.total_videos, 1);
        assert_eq!(timeline.metadata.total_duration, 3000);
    }

    #[test]
    fn soft_delete_hides_but_retains() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        std::fs::create_dir_all(root.path().join("demo")).unwrap();

        let entry = store.append_recording("demo", recording("recording-1.mp4")).unwrap();
        assert!(store.soft_delete("demo", &entry.id).unwrap());

        let timeline = store.load("demo").unwrap();
        assert_eq!(timeline.entries.len(), 1);
        assert!(timeline.entries[0].deleted);
        assert!(timeline.entries[0].deleted_at.is_some());
        assert_eq!(timeline.visible_entries().count(), 0);
        assert_eq!(timeline.metadata.total_videos, 0);
    }

    #[test]
    fn soft_delete_unknown_id_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        std::fs::create_dir_all(root.path().join("demo")).unwrap();
        assert!(!store.soft_delete("demo", "missing").unwrap());
    }

    #[test]
    fn reconcile_promotes_orphans() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();
        add_clip(&dir, "dropped.mp4", "external clip data");

        let store = store(root.path());
        assert_eq!(store.reconcile("demo").unwrap(), 1);

        let timeline = store.load("demo").unwrap();
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].filename, "dropped.mp4");
        assert!(timeline.entries[0].checksum.is_some());
        assert_eq!(
            timeline.entries[0].label.as_deref(),
            Some("Added during timeline reconciliation")
        );
    }

    #[test]
    fn reconcile_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();
        add_clip(&dir, "a.mp4", "aaa");
        add_clip(&dir, "b.mp4", "bbb");

        let store = store(root.path());
        assert_eq!(store.reconcile("demo").unwrap(), 2);
        let first = store.load("demo").unwrap();

        assert_eq!(store.reconcile("demo").unwrap(), 0);
        let second = store.load("demo").unwrap();

        assert_eq!(first.entries.len(), second.entries.len());
        for (a, b) in first.entries.iter().zip(second.entries.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.filename, b.filename);
        }
        // No changes on the second pass means no rewrite.
        assert_eq!(first.last_modified, second.last_modified);
    }

    #[test]
    fn reconcile_reattaches_renamed_file_by_checksum() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();
        add_clip(&dir, "recording-2.mp4", "unique recording bytes");

        let store = store(root.path());
        let mut timeline = store.load("demo").unwrap();
        timeline.entries.push(TimelineEntry {
            id: "keep-me".into(),
            filename: "recording-2.mp4".into(),
            label: Some("best take".into()),
            thumbnail: None,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 4200,
            deleted: false,
            deleted_at: None,
            aspect_ratio: "16:9".into(),
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            mic_enabled: true,
            checksum: Some(file_checksum(&dir.join("recording-2.mp4")).unwrap()),
        });
        store.save("demo", &mut timeline).unwrap();

        std::fs::rename(dir.join("recording-2.mp4"), dir.join("demo.mp4")).unwrap();
        assert_eq!(store.reconcile("demo").unwrap(), 0);

        let timeline = store.load("demo").unwrap();
        assert_eq!(timeline.entries.len(), 1);
        let entry = &timeline.entries[0];
        assert_eq!(entry.id, "keep-me");
        assert_eq!(entry.filename, "demo.mp4");
        assert_eq!(entry.label.as_deref(), Some("best take"));
        assert_eq!(entry.duration_ms, 4200);
    }

    #[test]
    fn reconcile_keeps_entries_for_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir_all(&dir).unwrap();

        let store = store(root.path());
        let mut timeline = store.load("demo").unwrap();
        timeline.entries.push(TimelineEntry {
            id: "ghost".into(),
            filename: "gone.mp4".into(),
            label: None,
            thumbnail: None,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 1000,
            deleted: false,
            deleted_at: None,
            aspect_ratio: "none".into(),
            resolution: Resolution { width: 0, height: 0 },
            mic_enabled: false,
            checksum: Some("no-file-has-this".into()),
        });
        store.save("demo", &mut timeline).unwrap();

        assert_eq!(store.reconcile("demo").unwrap(), 0);
        let timeline = store.load("demo").unwrap();
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.entries[0].id, "ghost");
    }

    #[test]
    fn reconcile_missing_project_fails() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        assert!(matches!(
            store.reconcile("nope"),
            Err(EngineError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn timeline_json_uses_camel_case() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        std::fs::create_dir_all(root.path().join("demo")).unwrap();
        store.append_recording("demo", recording("recording-1.mp4")).unwrap();

        let raw = std::fs::read_to_string(
            root.path().join("demo").join(TIMELINE_FILENAME),
        )
        .unwrap();
        assert!(raw.contains("\"projectName\""));
        assert!(raw.contains("\"durationMs\""));
        assert!(raw.contains("\"recordedAt\""));
        assert!(raw.contains("\"totalVideos\""));
    }

    #[test]
    fn aspect_ratios() {
        assert_eq!(aspect_ratio_for(1920, 1080), "16:9");
        assert_eq!(aspect_ratio_for(1080, 1920), "9:16");
        assert_eq!(aspect_ratio_for(1000, 1000), "none");
        assert_eq!(aspect_ratio_for(0, 0), "none");
    }
}
