// The command surface invoked by the UI shell.

use std::path::PathBuf;

use log::{debug, info};
use serde::Serialize;

use pushtohold_capture::backend::AudioDevice;
use pushtohold_capture::CaptureRegion;

use crate::coordinator::SLOW_START_THRESHOLD_MS;
use crate::error::EngineError;
use crate::events::{EngineEvent, RegionSelectorPayload};
use crate::paths;
use crate::preinit::PreInitStatus;
use crate::timeline::ProjectTimeline;
use crate::watcher;
use crate::Engine;

/// Listing entry for the project picker, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "videoCount")]
    pub video_count: u32,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSettings {
    /// Expected maximum time from hotkey press to recording start.
    #[serde(rename = "hotkeyToRecordingThresholdMs")]
    pub hotkey_to_recording_threshold_ms: u128,
}

impl Engine {
    // --- output folder ---------------------------------------------------

    pub fn get_output_folder(&self) -> String {
        self.state.output_root().to_string_lossy().to_string()
    }

    /// Point the engine at a new output root. Rewatches the new root and
    /// invalidates the warm session (its output directory changed).
    pub fn set_output_folder(&self, path: &str) -> Result<(), EngineError> {
        let root = paths::expand_home(path);
        std::fs::create_dir_all(&root)?;

        *self.state.output_root.lock().unwrap() = root.clone();

        let rewatched = watcher::watch_output_root(
            root,
            self.watcher_control.clone(),
            self.bus.clone(),
        )
        .map_err(|e| EngineError::CaptureUnavailable(format!("watch output folder: {e}")))?;
        *self.watcher.lock().unwrap() = Some(rewatched);

        self.rebuild_pre_init();
        Ok(())
    }

    // --- capture settings ------------------------------------------------

    pub fn set_mic_enabled(&self, enabled: bool) {
        *self.state.mic_enabled.lock().unwrap() = enabled;
        info!("🎤 microphone {}", if enabled { "enabled" } else { "disabled" });
        self.rebuild_pre_init();
    }

    pub fn get_audio_devices(&self) -> Result<Vec<AudioDevice>, EngineError> {
        Ok(self.backend.audio_devices()?)
    }

    pub fn set_audio_device(&self, device_id: String) {
        info!("🎤 audio device changed to {device_id}");
        *self.state.microphone_device_id.lock().unwrap() = Some(device_id);
        self.rebuild_pre_init();
    }

    pub fn authorize_capture(&self) -> Result<bool, EngineError> {
        Ok(self.backend.request_permission()?)
    }

    pub fn set_capture_region(&self, x: u32, y: u32, width: u32, height: u32) {
        info!("📏 capture region set: {width}x{height} at ({x}, {y})");
        *self.state.capture_region.lock().unwrap() = Some(CaptureRegion {
            x,
            y,
            width,
            height,
        });
        self.rebuild_pre_init();
    }

    pub fn clear_capture_region(&self) {
        info!("🖥️  capture region cleared, back to full display");
        *self.state.capture_region.lock().unwrap() = None;
        self.rebuild_pre_init();
    }

    pub fn get_capture_region(&self) -> Option<CaptureRegion> {
        *self.state.capture_region.lock().unwrap()
    }

    // --- projects --------------------------------------------------------

    pub fn create_project(&self, project_name: &str) -> Result<(), EngineError> {
        let name = project_name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidProjectName("empty name".into()));
        }
        if name.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']) {
            return Err(EngineError::InvalidProjectName(format!(
                "{name:?} contains filesystem-unsafe characters"
            )));
        }

        let dir = paths::project_dir(&self.state.output_root(), name);
        if dir.exists() {
            return Err(EngineError::InvalidProjectName(format!(
                "project {name:?} already exists"
            )));
        }
        std::fs::create_dir_all(&dir)?;

        let mut timeline = ProjectTimeline::new(name);
        self.store().save(name, &mut timeline)?;

        *self.state.current_project.lock().unwrap() = Some(name.to_string());
        self.rebuild_pre_init();
        Ok(())
    }

    pub fn get_projects(&self) -> Result<Vec<ProjectSummary>, EngineError> {
        let root = self.state.output_root();
        let mut projects = Vec::new();
        if !root.exists() {
            return Ok(projects);
        }

        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };

            // A missing or corrupt timeline does not hide the project.
            let summary = match self.store().load(&name) {
                Ok(timeline) => ProjectSummary {
                    name,
                    created_at: timeline.created_at,
                    video_count: timeline.metadata.total_videos,
                    last_modified: timeline.last_modified,
                },
                Err(e) => {
                    debug!("unreadable timeline for {name}: {e}");
                    let now = chrono::Utc::now().to_rfc3339();
                    ProjectSummary {
                        name,
                        created_at: now.clone(),
                        video_count: 0,
                        last_modified: now,
                    }
                }
            };
            projects.push(summary);
        }

        projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(projects)
    }

    pub fn get_current_project(&self) -> Option<String> {
        self.state.current_project()
    }

    /// Select the project recordings land in; warms up the capture pipeline
    /// for it so the next press is instant.
    pub fn set_current_project(&self, project_name: &str) -> Result<(), EngineError> {
        let dir = paths::project_dir(&self.state.output_root(), project_name);
        if !dir.exists() {
            return Err(EngineError::ProjectNotFound(project_name.to_string()));
        }
        *self.state.current_project.lock().unwrap() = Some(project_name.to_string());
        self.rebuild_pre_init();
        Ok(())
    }

    // --- timeline --------------------------------------------------------

    pub fn get_project_timeline(&self, project_name: &str) -> Result<ProjectTimeline, EngineError> {
        let dir = paths::project_dir(&self.state.output_root(), project_name);
        if !dir.exists() {
            return Err(EngineError::ProjectNotFound(project_name.to_string()));
        }
        self.store().load(project_name)
    }

    /// Persist a user edit (reorder, relabel, soft delete). The replaced
    /// state goes onto the undo stack.
    pub fn save_project_timeline(
        &self,
        project_name: &str,
        mut timeline: ProjectTimeline,
    ) -> Result<(), EngineError> {
        let previous = self.store().load(project_name)?;
        self.histories
            .lock()
            .unwrap()
            .entry(project_name.to_string())
            .or_default()
            .record(previous);
        self.store().save(project_name, &mut timeline)
    }

    /// Step the timeline back one user edit. Returns whether anything
    /// changed.
    pub fn undo_timeline(&self, project_name: &str) -> Result<bool, EngineError> {
        let present = self.store().load(project_name)?;
        let restored = self
            .histories
            .lock()
            .unwrap()
            .entry(project_name.to_string())
            .or_default()
            .undo(present);
        match restored {
            Some(mut timeline) => {
                self.store().save(project_name, &mut timeline)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo_timeline(&self, project_name: &str) -> Result<bool, EngineError> {
        let present = self.store().load(project_name)?;
        let restored = self
            .histories
            .lock()
            .unwrap()
            .entry(project_name.to_string())
            .or_default()
            .redo(present);
        match restored {
            Some(mut timeline) => {
                self.store().save(project_name, &mut timeline)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cross-check a project's timeline against the files on disk; returns
    /// how many external files were promoted to entries.
    pub fn reconcile_project_timeline(&self, project_name: &str) -> Result<u32, EngineError> {
        self.store().reconcile(project_name)
    }

    // --- pre-init --------------------------------------------------------

    pub fn get_pre_init_status(&self) -> PreInitStatus {
        self.preinit.status()
    }

    pub fn toggle_pre_init(&self) -> PreInitStatus {
        self.preinit.touch_activity();
        self.preinit.toggle(self.state.current_profile())
    }

    /// Called on user interactions so the idle shutdown stays away while
    /// the user is around.
    pub fn update_activity(&self) {
        self.preinit.touch_activity();
    }

    pub fn get_idle_timeout_mins(&self) -> u32 {
        *self.state.idle_timeout_mins.lock().unwrap()
    }

    /// Zero disables the idle shutdown.
    pub fn set_idle_timeout_mins(&self, timeout_mins: u32) {
        *self.state.idle_timeout_mins.lock().unwrap() = timeout_mins;
        info!("⏰ idle timeout set to {timeout_mins} minutes");
    }

    pub fn get_performance_settings(&self) -> PerformanceSettings {
        PerformanceSettings {
            hotkey_to_recording_threshold_ms: SLOW_START_THRESHOLD_MS,
        }
    }

    // --- focus tracking --------------------------------------------------

    /// The window coming back into view counts as activity and re-arms the
    /// warm session if the idle shutdown released it.
    pub fn on_focus_gained(&self) {
        let was_focused = {
            let mut focused = self.state.window_focused.lock().unwrap();
            std::mem::replace(&mut *focused, true)
        };
        if was_focused {
            return;
        }
        self.preinit.touch_activity();
        if self.preinit.status() == PreInitStatus::NotInitialized {
            self.rebuild_pre_init();
        }
    }

    pub fn on_focus_lost(&self) {
        *self.state.window_focused.lock().unwrap() = false;
    }

    // --- shell helpers ---------------------------------------------------

    pub fn open_file(&self, path: &str) -> Result<(), EngineError> {
        let expanded = paths::expand_home(path);
        if !expanded.exists() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", expanded.display()),
            )));
        }
        open_with_system(&expanded, false)
    }

    pub fn open_folder(&self, path: &str) -> Result<(), EngineError> {
        let expanded = paths::expand_home(path);
        if !expanded.is_dir() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a folder", expanded.display()),
            )));
        }
        open_with_system(&expanded, true)
    }

    /// The overlay window itself belongs to the shell; the engine only
    /// broadcasts that it should appear.
    pub fn open_region_selector(&self, aspect_ratio: &str, scale_to_preset: bool) {
        self.bus.emit(EngineEvent::RegionSelector(RegionSelectorPayload {
            open: true,
            aspect_ratio: aspect_ratio.to_string(),
            scale_to_preset,
        }));
    }

    pub fn close_region_selector(&self) {
        self.bus.emit(EngineEvent::RegionSelector(RegionSelectorPayload {
            open: false,
            aspect_ratio: String::new(),
            scale_to_preset: false,
        }));
    }
}

fn open_with_system(path: &PathBuf, _is_dir: bool) -> Result<(), EngineError> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = std::process::Command::new("open");
        c.arg(path);
        c
    };

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = std::process::Command::new("explorer");
        c.arg(path);
        c
    };

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(path);
        c
    };

    command.spawn()?;
    Ok(())
}
