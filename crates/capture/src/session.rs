// One recording session: a screen stream, optionally a microphone stream,
// and the pipeline that moves their samples into the encoder sink.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::{self, AudioStream, CaptureBackend, SampleCallback, ScreenStream};
use crate::clock::TimestampNormalizer;
use crate::error::CaptureError;
use crate::sample::{RawSample, Track};
use crate::sink::MediaSink;
use crate::RecordingConfig;

/// Session lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    PreInitialized,
    Recording,
    Stopping,
    Finalized,
}

/// State shared with the capture delivery threads.
struct SessionShared {
    /// Set before `stream.start` so the first audio buffer, which may arrive
    /// immediately, is not dropped.
    is_recording: AtomicBool,
    normalizer: Mutex<TimestampNormalizer>,
    /// `None` outside of a recording; taking it out marks the inputs
    /// finished, so in-flight callbacks drop their samples cleanly.
    sink: Mutex<Option<Box<dyn MediaSink>>>,
    dropped: AtomicUsize,
}

impl SessionShared {
    fn ingest(&self, sample: RawSample) {
        if !self.is_recording.load(Ordering::SeqCst) {
            // Pre-initialized audio runs hot; its buffers are discarded
            // until the session flips to recording.
            return;
        }

        let (first_video, sample) = {
            let mut normalizer = self.normalizer.lock().unwrap();
            let first_video = sample.track() == Track::Video && !normalizer.has_video();
            (first_video, normalizer.rebase(sample))
        };

        let result = {
            let mut slot = self.sink.lock().unwrap();
            match slot.as_mut() {
                Some(sink) => match &sample {
                    RawSample::Video(frame) => sink.append_video(frame),
                    RawSample::Audio(chunk) => sink.append_audio(chunk),
                },
                None => return,
            }
        };

        if let Err(e) = result {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("dropped one {:?} sample: {e}", sample.track());
            if first_video {
                // The reference frame never made it into the file; the next
                // video sample becomes the reference instead.
                self.normalizer.lock().unwrap().rearm_video();
            }
        }
    }
}

/// Owns the capture streams for one recording and routes their samples
/// through the timestamp normalizer into the encoder sink.
///
/// Built ahead of user intent by the pre-init manager: `pre_initialize` does
/// the slow work (content enumeration, stream configuration, starting the
/// microphone), leaving `start` a single fast stream-start call.
pub struct CaptureSession {
    config: RecordingConfig,
    backend: Arc<dyn CaptureBackend>,
    state: SessionState,
    shared: Arc<SessionShared>,
    screen: Option<Box<dyn ScreenStream>>,
    audio: Option<Box<dyn AudioStream>>,
    started_at: Option<Instant>,
}

impl CaptureSession {
    pub fn new(
        config: RecordingConfig,
        backend: Arc<dyn CaptureBackend>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            state: SessionState::Created,
            shared: Arc::new(SessionShared {
                is_recording: AtomicBool::new(false),
                normalizer: Mutex::new(TimestampNormalizer::new()),
                sink: Mutex::new(None),
                dropped: AtomicUsize::new(0),
            }),
            screen: None,
            audio: None,
            started_at: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Whether a microphone stream survived device selection.
    pub fn mic_active(&self) -> bool {
        self.audio.is_some()
    }

    /// Build the capture pipeline. Slow (seconds on real hardware); runs off
    /// the hot path. After this, `start` is fast.
    pub fn pre_initialize(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Created {
            return Err(CaptureError::AlreadyRecording);
        }

        let displays = self.backend.displays()?;
        let display = match self.config.display_id {
            Some(id) => displays.iter().find(|d| d.id == id),
            None => displays.iter().find(|d| d.is_primary).or(displays.first()),
        }
        .ok_or_else(|| CaptureError::unavailable("no capturable display"))?;

        if let Some(region) = &self.config.region {
            let fits = region.x + region.width <= display.width
                && region.y + region.height <= display.height;
            if !fits {
                return Err(CaptureError::ConfigRejected(format!(
                    "region {}x{}+{}+{} lies outside display {} ({}x{})",
                    region.width, region.height, region.x, region.y,
                    display.id, display.width, display.height
                )));
            }
            self.config.width = region.width;
            self.config.height = region.height;
        } else {
            self.config.width = display.width;
            self.config.height = display.height;
        }

        let shared = self.shared.clone();
        let on_sample: SampleCallback = Arc::new(move |sample| shared.ingest(sample));

        self.screen = Some(self.backend.open_screen(&self.config, on_sample.clone())?);

        if self.config.capture_microphone {
            match self.open_microphone(on_sample) {
                Some(mut stream) => {
                    // Live immediately; buffers are discarded until start.
                    stream.start()?;
                    self.audio = Some(stream);
                }
                None => {
                    warn!("no usable microphone, continuing without audio");
                    self.config.capture_microphone = false;
                }
            }
        }

        self.state = SessionState::PreInitialized;
        debug!(
            "capture session pre-initialized: {}x{}@{} mic={}",
            self.config.width,
            self.config.height,
            self.config.fps,
            self.audio.is_some()
        );
        Ok(())
    }

    fn open_microphone(&self, on_sample: SampleCallback) -> Option<Box<dyn AudioStream>> {
        let devices = match self.backend.audio_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("audio device enumeration failed: {e}");
                return None;
            }
        };
        let device =
            backend::select_microphone(&devices, self.config.microphone_device_id.as_deref())?;
        info!("🎤 recording microphone: {} ({})", device.name, device.id);
        match self.backend.open_audio(&device, on_sample) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("failed to open microphone {}: {e}", device.id);
                None
            }
        }
    }

    /// Begin recording into `output_path`. Fast; the target is under 100 ms
    /// from hotkey press.
    pub fn start(&mut self, output_path: PathBuf) -> Result<(), CaptureError> {
        match self.state {
            SessionState::PreInitialized => {}
            SessionState::Recording => return Err(CaptureError::AlreadyRecording),
            _ => return Err(CaptureError::NotReady),
        }

        self.config.output_path = output_path.clone();

        let mut sink = self.backend.new_sink(&self.config, output_path)?;
        sink.start()?;
        *self.shared.sink.lock().unwrap() = Some(sink);
        self.shared.normalizer.lock().unwrap().reset();

        // Flip before stream.start: the first audio buffer can arrive
        // before stream.start returns, and a release during a slow start
        // must find the flag set.
        self.shared.is_recording.store(true, Ordering::SeqCst);

        let screen = self.screen.as_mut().ok_or(CaptureError::NotReady)?;
        if let Err(e) = screen.start() {
            self.shared.is_recording.store(false, Ordering::SeqCst);
            self.shared.sink.lock().unwrap().take();
            return Err(e);
        }

        self.started_at = Some(Instant::now());
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Stop capture, finalize the container, and return the output path and
    /// the wall-clock duration.
    ///
    /// Duration comes from the start instant, not from encoded timestamps:
    /// samples may still be in flight when stop is signalled.
    pub fn stop(&mut self) -> Result<(PathBuf, Duration), CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        self.state = SessionState::Stopping;
        let duration = self
            .started_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);

        if let Some(screen) = self.screen.as_mut() {
            if let Err(e) = screen.stop() {
                warn!("screen stream stop reported: {e}");
            }
        }

        // Taking the sink out marks both inputs finished; late callbacks
        // find the slot empty and drop their samples.
        let sink = self.shared.sink.lock().unwrap().take();

        if let Some(audio) = self.audio.as_mut() {
            if let Err(e) = audio.stop() {
                warn!("audio stream stop reported: {e}");
            }
        }

        let path = match sink {
            Some(mut sink) => sink.finish()?,
            None => return Err(CaptureError::NotRecording),
        };

        self.shared.is_recording.store(false, Ordering::SeqCst);
        self.state = SessionState::Finalized;

        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("{dropped} samples were dropped during this recording");
        }
        info!(
            "✅ recording finalized: {:?} ({:.2}s)",
            path,
            duration.as_secs_f64()
        );
        Ok((path, duration))
    }

    /// Wall-clock time recorded so far; zero once finalized (the durable
    /// value lives in the timeline entry).
    pub fn duration(&self) -> Duration {
        match self.state {
            SessionState::Recording | SessionState::Stopping => self
                .started_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }
}
