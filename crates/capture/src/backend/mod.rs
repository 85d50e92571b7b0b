// The narrow platform abstraction.
//
// The OS screen-capture framework, the microphone capture framework and the
// muxer live behind these traits; everything above them (normalizer, sink,
// session, coordinator) is platform-independent.

use std::sync::Arc;

use log::warn;

use crate::error::CaptureError;
use crate::sample::RawSample;
use crate::sink::MediaSink;
use crate::RecordingConfig;

#[cfg(target_os = "macos")]
pub mod macos;
pub mod synthetic;

/// Callback invoked by capture streams for every raw sample, on the
/// stream's own delivery thread.
pub type SampleCallback = Arc<dyn Fn(RawSample) + Send + Sync>;

/// A display that can be captured.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// An audio input device.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub is_builtin: bool,
}

/// A running (or startable) screen capture stream. Built during
/// pre-initialization with its sample callback already attached, so `start`
/// is a single fast call.
pub trait ScreenStream: Send {
    fn start(&mut self) -> Result<(), CaptureError>;
    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// A microphone capture stream. Started during pre-initialization; its
/// samples flow (and are discarded) until the session flips to recording.
pub trait AudioStream: Send {
    fn start(&mut self) -> Result<(), CaptureError>;
    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Factory for the platform capture primitives.
pub trait CaptureBackend: Send + Sync {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    fn audio_devices(&self) -> Result<Vec<AudioDevice>, CaptureError>;

    /// Request the OS screen-recording permission. Returns whether capture
    /// is currently authorized.
    fn request_permission(&self) -> Result<bool, CaptureError>;

    /// Enumerate content, build the filter, configure stream parameters and
    /// attach the sample callback. The slow part of pre-initialization.
    fn open_screen(
        &self,
        config: &RecordingConfig,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn ScreenStream>, CaptureError>;

    /// Build a microphone capture stream for the given device.
    fn open_audio(
        &self,
        device: &AudioDevice,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn AudioStream>, CaptureError>;

    /// Build the muxing sink for a recording about to start.
    fn new_sink(
        &self,
        config: &RecordingConfig,
        output_path: std::path::PathBuf,
    ) -> Result<Box<dyn MediaSink>, CaptureError>;
}

/// The native backend for the current platform.
pub fn platform() -> Result<Arc<dyn CaptureBackend>, CaptureError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::MacBackend::new()))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(CaptureError::unavailable(
            "no native capture backend for this platform",
        ))
    }
}

/// Pick the microphone to record from.
///
/// Order: the explicitly requested device, then a built-in microphone, then
/// the OS default input. `None` means record without audio; the caller logs
/// the downgrade.
pub fn select_microphone(
    devices: &[AudioDevice],
    requested: Option<&str>,
) -> Option<AudioDevice> {
    if let Some(id) = requested {
        if let Some(device) = devices.iter().find(|d| d.id == id) {
            return Some(device.clone());
        }
        warn!("requested microphone {id:?} not present, falling back");
    }

    devices
        .iter()
        .find(|d| d.is_builtin)
        .or_else(|| devices.iter().find(|d| d.is_default))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, is_default: bool, is_builtin: bool) -> AudioDevice {
        AudioDevice {
            id: id.into(),
            name: id.into(),
            is_default,
            is_builtin,
        }
    }

    #[test]
    fn explicit_device_wins() {
        let devices = vec![
            device("builtin", false, true),
            device("usb", true, false),
        ];
        let picked = select_microphone(&devices, Some("usb")).unwrap();
        assert_eq!(picked.id, "usb");
    }

    #[test]
    fn builtin_preferred_over_default() {
        let devices = vec![
            device("usb", true, false),
            device("builtin", false, true),
        ];
        let picked = select_microphone(&devices, None).unwrap();
        assert_eq!(picked.id, "builtin");
    }

    #[test]
    fn default_when_no_builtin() {
        let devices = vec![device("usb", true, false), device("other", false, false)];
        let picked = select_microphone(&devices, None).unwrap();
        assert_eq!(picked.id, "usb");
    }

    #[test]
    fn missing_requested_device_falls_back() {
        let devices = vec![device("builtin", true, true)];
        let picked = select_microphone(&devices, Some("gone")).unwrap();
        assert_eq!(picked.id, "builtin");
    }

    #[test]
    fn no_devices_means_no_audio() {
        assert!(select_microphone(&[], None).is_none());
    }
}
