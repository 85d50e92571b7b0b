// macOS backend: ScreenCaptureKit screen frames + AVFoundation microphone,
// bridged through the ScreenTap Objective-C shim.
//
// The shim delivers raw BGRA frames and float PCM buffers with host-clock
// timestamps; everything downstream (normalization, encoding, muxing) runs
// in Rust.

#![allow(non_camel_case_types)]

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

use crate::error::CaptureError;
use crate::sample::{AudioChunk, RawSample, VideoFrame};
use crate::sink::{EncoderSink, MediaSink};
use crate::RecordingConfig;

use super::{
    AudioDevice, AudioStream, CaptureBackend, DisplayInfo, SampleCallback, ScreenStream,
};

#[repr(C)]
struct STStream {
    _private: [u8; 0],
}

#[repr(C)]
struct STAudioTap {
    _private: [u8; 0],
}

type STVideoCallback = extern "C" fn(
    bgra: *const u8,
    width: u32,
    height: u32,
    stride: usize,
    pts_nanos: i64,
    duration_nanos: i64,
    user_data: *mut c_void,
);

type STAudioCallback = extern "C" fn(
    samples: *const f32,
    sample_count: usize,
    channels: u16,
    sample_rate: u32,
    pts_nanos: i64,
    user_data: *mut c_void,
);

#[repr(C)]
struct STDisplayInfo {
    display_id: u32,
    width: u32,
    height: u32,
    is_primary: bool,
}

#[repr(C)]
struct STAudioDeviceInfo {
    device_id: *mut c_char,
    device_name: *mut c_char,
    is_default: bool,
    is_builtin: bool,
}

#[repr(C)]
struct STAudioDeviceList {
    devices: *mut STAudioDeviceInfo,
    count: usize,
}

extern "C" {
    fn st_list_displays(out: *mut STDisplayInfo, capacity: usize) -> i32;
    fn st_capture_authorized() -> bool;
    fn st_request_capture_permission() -> bool;

    fn st_stream_create(
        display_id: u32,
        region_x: u32,
        region_y: u32,
        region_width: u32,
        region_height: u32,
        fps: u32,
        show_cursor: bool,
        callback: STVideoCallback,
        user_data: *mut c_void,
    ) -> *mut STStream;
    fn st_stream_start(stream: *mut STStream) -> i32;
    fn st_stream_stop(stream: *mut STStream) -> i32;
    fn st_stream_free(stream: *mut STStream);
    fn st_stream_last_error(stream: *mut STStream) -> *const c_char;

    fn st_audio_tap_create(
        device_id: *const c_char,
        callback: STAudioCallback,
        user_data: *mut c_void,
    ) -> *mut STAudioTap;
    fn st_audio_tap_start(tap: *mut STAudioTap) -> i32;
    fn st_audio_tap_stop(tap: *mut STAudioTap) -> i32;
    fn st_audio_tap_free(tap: *mut STAudioTap);

    fn st_list_audio_devices() -> *mut STAudioDeviceList;
    fn st_free_audio_device_list(list: *mut STAudioDeviceList);
}

extern "C" fn video_trampoline(
    bgra: *const u8,
    width: u32,
    height: u32,
    stride: usize,
    pts_nanos: i64,
    duration_nanos: i64,
    user_data: *mut c_void,
) {
    if bgra.is_null() || user_data.is_null() {
        return;
    }
    let callback = unsafe { &*(user_data as *const SampleCallback) };
    let data = unsafe { std::slice::from_raw_parts(bgra, stride * height as usize) }.to_vec();
    callback(RawSample::Video(VideoFrame {
        data,
        width,
        height,
        stride,
        pts: pts_nanos,
        duration: (duration_nanos > 0).then_some(duration_nanos),
    }));
}

extern "C" fn audio_trampoline(
    samples: *const f32,
    sample_count: usize,
    channels: u16,
    sample_rate: u32,
    pts_nanos: i64,
    user_data: *mut c_void,
) {
    if samples.is_null() || user_data.is_null() {
        return;
    }
    let callback = unsafe { &*(user_data as *const SampleCallback) };
    let samples = unsafe { std::slice::from_raw_parts(samples, sample_count) }.to_vec();
    callback(RawSample::Audio(AudioChunk {
        samples,
        channels,
        sample_rate,
        pts: pts_nanos,
    }));
}

pub struct MacBackend;

impl MacBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MacBackend {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let mut raw = [const {
            STDisplayInfo {
                display_id: 0,
                width: 0,
                height: 0,
                is_primary: false,
            }
        }; 16];
        let count = unsafe { st_list_displays(raw.as_mut_ptr(), raw.len()) };
        if count < 0 {
            return Err(CaptureError::unavailable("display enumeration failed"));
        }
        Ok(raw[..count as usize]
            .iter()
            .map(|d| DisplayInfo {
                id: d.display_id,
                width: d.width,
                height: d.height,
                is_primary: d.is_primary,
            })
            .collect())
    }

    fn audio_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        unsafe {
            let list_ptr = st_list_audio_devices();
            if list_ptr.is_null() {
                return Err(CaptureError::unavailable("audio device enumeration failed"));
            }
            let list = &*list_ptr;
            let mut devices = Vec::with_capacity(list.count);
            for i in 0..list.count {
                let raw = &*list.devices.add(i);
                devices.push(AudioDevice {
                    id: cstr_to_string(raw.device_id),
                    name: cstr_to_string(raw.device_name),
                    is_default: raw.is_default,
                    is_builtin: raw.is_builtin,
                });
            }
            st_free_audio_device_list(list_ptr);
            Ok(devices)
        }
    }

    fn request_permission(&self) -> Result<bool, CaptureError> {
        if unsafe { st_capture_authorized() } {
            return Ok(true);
        }
        Ok(unsafe { st_request_capture_permission() })
    }

    fn open_screen(
        &self,
        config: &RecordingConfig,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn ScreenStream>, CaptureError> {
        if !unsafe { st_capture_authorized() } {
            return Err(CaptureError::PermissionDenied);
        }

        let display_id = config.display_id.unwrap_or(0);
        let (x, y, w, h) = match config.region {
            Some(region) => (region.x, region.y, region.width, region.height),
            None => (0, 0, 0, 0),
        };

        // The callback moves behind a stable heap pointer the shim owns for
        // the stream's lifetime.
        let user_data = Box::into_raw(Box::new(on_sample)) as *mut c_void;
        let stream = unsafe {
            st_stream_create(
                display_id,
                x,
                y,
                w,
                h,
                config.fps,
                config.capture_cursor,
                video_trampoline,
                user_data,
            )
        };
        if stream.is_null() {
            drop(unsafe { Box::from_raw(user_data as *mut SampleCallback) });
            return Err(CaptureError::unavailable(
                "failed to build ScreenCaptureKit stream",
            ));
        }
        Ok(Box::new(MacScreenStream { stream, user_data }))
    }

    fn open_audio(
        &self,
        device: &AudioDevice,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn AudioStream>, CaptureError> {
        let device_id = CString::new(device.id.as_str())
            .map_err(|_| CaptureError::stream("audio device id contains NUL"))?;
        let user_data = Box::into_raw(Box::new(on_sample)) as *mut c_void;
        let tap = unsafe {
            st_audio_tap_create(
                if device.id.is_empty() {
                    ptr::null()
                } else {
                    device_id.as_ptr()
                },
                audio_trampoline,
                user_data,
            )
        };
        if tap.is_null() {
            drop(unsafe { Box::from_raw(user_data as *mut SampleCallback) });
            return Err(CaptureError::unavailable("failed to open microphone"));
        }
        Ok(Box::new(MacAudioStream { tap, user_data }))
    }

    fn new_sink(
        &self,
        config: &RecordingConfig,
        output_path: PathBuf,
    ) -> Result<Box<dyn MediaSink>, CaptureError> {
        Ok(Box::new(EncoderSink::open(config, output_path)?))
    }
}

struct MacScreenStream {
    stream: *mut STStream,
    user_data: *mut c_void,
}

unsafe impl Send for MacScreenStream {}

impl MacScreenStream {
    fn last_error(&self) -> String {
        unsafe {
            let err = st_stream_last_error(self.stream);
            if err.is_null() {
                "unknown error".into()
            } else {
                CStr::from_ptr(err).to_string_lossy().into_owned()
            }
        }
    }
}

impl ScreenStream for MacScreenStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        if unsafe { st_stream_start(self.stream) } != 0 {
            return Err(CaptureError::stream(self.last_error()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if unsafe { st_stream_stop(self.stream) } != 0 {
            return Err(CaptureError::stream(self.last_error()));
        }
        Ok(())
    }
}

impl Drop for MacScreenStream {
    fn drop(&mut self) {
        unsafe {
            st_stream_free(self.stream);
            drop(Box::from_raw(self.user_data as *mut SampleCallback));
        }
    }
}

struct MacAudioStream {
    tap: *mut STAudioTap,
    user_data: *mut c_void,
}

unsafe impl Send for MacAudioStream {}

impl AudioStream for MacAudioStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        if unsafe { st_audio_tap_start(self.tap) } != 0 {
            return Err(CaptureError::stream("failed to start microphone tap"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if unsafe { st_audio_tap_stop(self.tap) } != 0 {
            return Err(CaptureError::stream("failed to stop microphone tap"));
        }
        Ok(())
    }
}

impl Drop for MacAudioStream {
    fn drop(&mut self) {
        unsafe {
            st_audio_tap_free(self.tap);
            drop(Box::from_raw(self.user_data as *mut SampleCallback));
        }
    }
}

fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned()
    }
}
