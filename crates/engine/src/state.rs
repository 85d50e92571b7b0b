// Shared engine settings.
//
// Mutated by the command surface, read by the coordinator and the pre-init
// manager. Recording state itself is not here: the at-most-one invariant
// lives in the coordinator's atomic flag.

use std::path::PathBuf;
use std::sync::Mutex;

use pushtohold_capture::{CaptureRegion, RecordingConfig};

use crate::paths;

pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_QUALITY: u32 = 80;
pub const DEFAULT_IDLE_TIMEOUT_MINS: u32 = 5;

/// Everything a pre-initialized session encodes. Any change to any field
/// invalidates the held session; there are deliberately no "safe to change
/// without rebuild" settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProfile {
    pub project_name: String,
    pub project_dir: PathBuf,
    pub mic_enabled: bool,
    pub microphone_device_id: Option<String>,
    pub region: Option<CaptureRegion>,
    pub display_id: Option<u32>,
}

impl CaptureProfile {
    /// The recording configuration for a session built from this profile.
    /// The concrete output file is chosen at start time; the session only
    /// needs the project directory here.
    pub fn recording_config(&self) -> RecordingConfig {
        RecordingConfig {
            output_path: self.project_dir.join("recording-pending.mp4"),
            fps: DEFAULT_FPS,
            quality: DEFAULT_QUALITY,
            capture_microphone: self.mic_enabled,
            microphone_device_id: self.microphone_device_id.clone(),
            display_id: self.display_id,
            region: self.region,
            ..Default::default()
        }
    }
}

pub struct EngineState {
    pub output_root: Mutex<PathBuf>,
    pub mic_enabled: Mutex<bool>,
    pub microphone_device_id: Mutex<Option<String>>,
    pub capture_region: Mutex<Option<CaptureRegion>>,
    pub display_id: Mutex<Option<u32>>,
    pub current_project: Mutex<Option<String>>,
    pub idle_timeout_mins: Mutex<u32>,
    pub window_focused: Mutex<bool>,
}

impl EngineState {
    pub fn new(output_root: PathBuf) -> Self {
        Self {
            output_root: Mutex::new(output_root),
            mic_enabled: Mutex::new(true),
            microphone_device_id: Mutex::new(None),
            capture_region: Mutex::new(None),
            display_id: Mutex::new(None),
            current_project: Mutex::new(None),
            idle_timeout_mins: Mutex::new(DEFAULT_IDLE_TIMEOUT_MINS),
            window_focused: Mutex::new(true),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root.lock().unwrap().clone()
    }

    pub fn current_project(&self) -> Option<String> {
        self.current_project.lock().unwrap().clone()
    }

    /// Snapshot the capture-relevant settings for the given project.
    pub fn capture_profile(&self, project_name: &str) -> CaptureProfile {
        CaptureProfile {
            project_name: project_name.to_string(),
            project_dir: paths::project_dir(&self.output_root(), project_name),
            mic_enabled: *self.mic_enabled.lock().unwrap(),
            microphone_device_id: self.microphone_device_id.lock().unwrap().clone(),
            region: *self.capture_region.lock().unwrap(),
            display_id: *self.display_id.lock().unwrap(),
        }
    }

    /// Profile for the current project, if one is selected.
    pub fn current_profile(&self) -> Option<CaptureProfile> {
        self.current_project().map(|name| self.capture_profile(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_changes_when_settings_change() {
        let state = EngineState::new(PathBuf::from("/tmp/root"));
        *state.current_project.lock().unwrap() = Some("demo".into());

        let before = state.capture_profile("demo");
        *state.mic_enabled.lock().unwrap() = false;
        let after = state.capture_profile("demo");
        assert_ne!(before, after);
    }

    #[test]
    fn profile_builds_config_for_project_dir() {
        let state = EngineState::new(PathBuf::from("/tmp/root"));
        let profile = state.capture_profile("demo");
        let config = profile.recording_config();
        assert!(config.output_path.starts_with("/tmp/root/demo"));
        assert_eq!(config.fps, DEFAULT_FPS);
        assert!(config.capture_microphone);
    }
}
