// Filesystem layout: output root, per-project directories, and the
// sequential `recording-<N>.mp4` naming scheme.

use std::path::{Path, PathBuf};

pub const TIMELINE_FILENAME: &str = "timeline.json";

/// Directory helpers kept dependency-free.
pub mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

/// Platform-default output root: the user's movies/videos folder under a
/// `PushToHold` subdirectory.
pub fn default_output_root() -> PathBuf {
    #[cfg(target_os = "macos")]
    let root = dirs::home_dir()
        .map(|p| p.join("Movies").join("PushToHold"))
        .unwrap_or_else(|| PathBuf::from("~/Movies/PushToHold"));

    #[cfg(not(target_os = "macos"))]
    let root = dirs::home_dir()
        .map(|p| p.join("Videos").join("PushToHold"))
        .unwrap_or_else(|| PathBuf::from("~/Videos/PushToHold"));

    root
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn project_dir(root: &Path, project_name: &str) -> PathBuf {
    root.join(project_name)
}

pub fn timeline_path(project_dir: &Path) -> PathBuf {
    project_dir.join(TIMELINE_FILENAME)
}

/// Video extensions recognized by reconciliation and the watcher.
pub fn is_video_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => matches!(
            ext.to_string_lossy().to_lowercase().as_str(),
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v"
        ),
        None => false,
    }
}

/// Pick the next output path in `dir`.
///
/// Scans for `recording-<N>.mp4`, takes the maximum `N` (0 when none) and
/// returns `recording-<N+1>.mp4`. Gaps are preserved and files are never
/// overwritten.
pub fn next_recording_path(dir: &Path) -> std::io::Result<PathBuf> {
    let mut max_seen = 0u32;
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(n) = parse_recording_number(&entry.file_name().to_string_lossy()) {
                max_seen = max_seen.max(n);
            }
        }
    }
    Ok(dir.join(format!("recording-{}.mp4", max_seen + 1)))
}

fn parse_recording_number(filename: &str) -> Option<u32> {
    filename
        .strip_prefix("recording-")?
        .strip_suffix(".mp4")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recording_numbers() {
        assert_eq!(parse_recording_number("recording-1.mp4"), Some(1));
        assert_eq!(parse_recording_number("recording-42.mp4"), Some(42));
        assert_eq!(parse_recording_number("recording-.mp4"), None);
        assert_eq!(parse_recording_number("recording-7.mov"), None);
        assert_eq!(parse_recording_number("clip-7.mp4"), None);
    }

    #[test]
    fn first_recording_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let next = next_recording_path(dir.path()).unwrap();
        assert_eq!(next, dir.path().join("recording-1.mp4"));
    }

    #[test]
    fn gaps_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 4] {
            std::fs::write(dir.path().join(format!("recording-{n}.mp4")), b"x").unwrap();
        }
        let next = next_recording_path(dir.path()).unwrap();
        assert_eq!(next, dir.path().join("recording-5.mp4"));
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my-clip.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("recording-03.txt"), b"x").unwrap();
        let next = next_recording_path(dir.path()).unwrap();
        assert_eq!(next, dir.path().join("recording-1.mp4"));
    }

    #[test]
    fn missing_dir_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let next = next_recording_path(&dir.path().join("nope")).unwrap();
        assert!(next.ends_with("recording-1.mp4"));
    }

    #[test]
    fn video_extension_family() {
        assert!(is_video_file(Path::new("a.mp4")));
        assert!(is_video_file(Path::new("a.MOV")));
        assert!(is_video_file(Path::new("a.webm")));
        assert!(!is_video_file(Path::new("a.json")));
        assert!(!is_video_file(Path::new("a")));
    }
}
