// Synthetic capture backend.
//
// Generates gradient frames and silent audio on real threads with real
// monotonic timestamps. Used by the engine's integration tests and for
// headless bring-up of everything above the platform layer: pacing,
// shared-origin normalization, start/stop races and file production all
// behave like the native pipeline, without touching OS capture APIs.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::sample::{AudioChunk, RawSample, VideoFrame};
use crate::sink::MediaSink;
use crate::RecordingConfig;

use super::{
    AudioDevice, AudioStream, CaptureBackend, DisplayInfo, SampleCallback, ScreenStream,
};

const AUDIO_CHUNK_MS: u64 = 10;

pub struct SyntheticBackend {
    /// Simulated cost of content enumeration and stream configuration.
    init_delay: Duration,
    /// One clock for both tracks, like the host's media clock.
    epoch: Instant,
    displays: Vec<DisplayInfo>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::with_init_delay(Duration::ZERO)
    }

    pub fn with_init_delay(init_delay: Duration) -> Self {
        Self {
            init_delay,
            epoch: Instant::now(),
            displays: vec![DisplayInfo {
                id: 1,
                width: 1920,
                height: 1080,
                is_primary: true,
            }],
        }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Ok(self.displays.clone())
    }

    fn audio_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        Ok(vec![AudioDevice {
            id: "synthetic-builtin".into(),
            name: "Synthetic Built-in Microphone".into(),
            is_default: true,
            is_builtin: true,
        }])
    }

    fn request_permission(&self) -> Result<bool, CaptureError> {
        Ok(true)
    }

    fn open_screen(
        &self,
        config: &RecordingConfig,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn ScreenStream>, CaptureError> {
        if !self.init_delay.is_zero() {
            std::thread::sleep(self.init_delay);
        }
        Ok(Box::new(SyntheticScreenStream {
            fps: config.fps,
            width: config.width,
            height: config.height,
            epoch: self.epoch,
            on_sample,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }

    fn open_audio(
        &self,
        _device: &AudioDevice,
        on_sample: SampleCallback,
    ) -> Result<Box<dyn AudioStream>, CaptureError> {
        Ok(Box::new(SyntheticAudioStream {
            epoch: self.epoch,
            on_sample,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }

    fn new_sink(
        &self,
        config: &RecordingConfig,
        output_path: PathBuf,
    ) -> Result<Box<dyn MediaSink>, CaptureError> {
        Ok(Box::new(CountingSink::new(config.clone(), output_path)))
    }
}

struct SyntheticScreenStream {
    fps: u32,
    width: u32,
    height: u32,
    epoch: Instant,
    on_sample: SampleCallback,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ScreenStream for SyntheticScreenStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRecording);
        }
        let running = self.running.clone();
        let on_sample = self.on_sample.clone();
        let epoch = self.epoch;
        let interval = Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64);
        let (width, height) = (self.width, self.height);

        self.worker = Some(std::thread::spawn(move || {
            let frame_nanos = interval.as_nanos() as i64;
            let mut tick = 0u32;
            while running.load(Ordering::SeqCst) {
                let pts = epoch.elapsed().as_nanos() as i64;
                // A moving two-pixel-row gradient; enough to make encoded
                // output non-degenerate without burning CPU on full frames.
                let mut data = vec![0u8; (width * height * 4) as usize];
                let band = (tick % height) as usize * (width * 4) as usize;
                for b in data[band..band + (width * 4) as usize].iter_mut() {
                    *b = 0xff;
                }
                on_sample(RawSample::Video(VideoFrame {
                    data,
                    width,
                    height,
                    stride: (width * 4) as usize,
                    pts,
                    duration: Some(frame_nanos),
                }));
                tick = tick.wrapping_add(1);
                std::thread::sleep(interval);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

struct SyntheticAudioStream {
    epoch: Instant,
    on_sample: SampleCallback,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AudioStream for SyntheticAudioStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let running = self.running.clone();
        let on_sample = self.on_sample.clone();
        let epoch = self.epoch;
        let interval = Duration::from_millis(AUDIO_CHUNK_MS);
        let samples_per_chunk = (48_000 * AUDIO_CHUNK_MS / 1000) as usize;

        self.worker = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let pts = epoch.elapsed().as_nanos() as i64;
                on_sample(RawSample::Audio(AudioChunk {
                    samples: vec![0.0; samples_per_chunk],
                    channels: 1,
                    sample_rate: 48_000,
                    pts,
                }));
                std::thread::sleep(interval);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

/// Sink that records how much it was fed and writes a small plain file, so
/// path selection, checksumming and timeline plumbing can be exercised
/// without an encoder.
pub struct CountingSink {
    config: RecordingConfig,
    output_path: PathBuf,
    started: bool,
    video_frames: Arc<AtomicUsize>,
    audio_chunks: Arc<AtomicUsize>,
}

impl CountingSink {
    pub fn new(config: RecordingConfig, output_path: PathBuf) -> Self {
        Self {
            config,
            output_path,
            started: false,
            video_frames: Arc::new(AtomicUsize::new(0)),
            audio_chunks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (self.video_frames.clone(), self.audio_chunks.clone())
    }
}

impl MediaSink for CountingSink {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn append_video(&mut self, _frame: &VideoFrame) -> Result<(), CaptureError> {
        if !self.started {
            return Err(CaptureError::NotRecording);
        }
        self.video_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append_audio(&mut self, _chunk: &AudioChunk) -> Result<(), CaptureError> {
        if !self.started {
            return Err(CaptureError::NotRecording);
        }
        self.audio_chunks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf, CaptureError> {
        let mut file = std::fs::File::create(&self.output_path)?;
        writeln!(
            file,
            "synthetic recording {}x{}@{} video_frames={} audio_chunks={} path={}",
            self.config.width,
            self.config.height,
            self.config.fps,
            self.video_frames.load(Ordering::SeqCst),
            self.audio_chunks.load(Ordering::SeqCst),
            self.output_path.display(),
        )?;
        Ok(self.output_path.clone())
    }
}
