// Streaming MP4 encoder sink backed by FFmpeg.
//
// Samples are encoded as they arrive and written straight into the output
// container. Memory stays bounded for arbitrarily long recordings and the
// encoder runs concurrently with capture.

use ffmpeg_next as ffmpeg;
use log::{debug, warn};
use std::path::PathBuf;

use crate::error::CaptureError;
use crate::sample::{AudioChunk, VideoFrame};
use crate::RecordingConfig;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_BITRATE: usize = 128_000;

/// The muxer-facing contract of the pipeline.
///
/// `EncoderSink` is the production implementation; tests substitute
/// lightweight sinks through the same trait.
pub trait MediaSink: Send {
    /// Begin the writing session, anchored at source time zero.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Append one normalized video frame. A failure here is transient for
    /// the recording; callers log and continue.
    fn append_video(&mut self, frame: &VideoFrame) -> Result<(), CaptureError>;

    /// Append one normalized audio chunk.
    fn append_audio(&mut self, chunk: &AudioChunk) -> Result<(), CaptureError>;

    /// Flush both encoders and write the container trailer. After this the
    /// file is complete and playable. Failure here is fatal for the
    /// recording: the output may be truncated and must be reported as such.
    fn finish(&mut self) -> Result<PathBuf, CaptureError>;
}

/// H.264 + AAC streaming MP4 writer.
///
/// Construction opens the output file and declares the video input (and the
/// audio input iff the microphone is enabled). `start` writes the container
/// header; `finish` flushes and writes the trailer.
pub struct EncoderSink {
    octx: ffmpeg::format::context::Output,
    output_path: PathBuf,
    video: VideoLane,
    audio: Option<AudioLane>,
    started: bool,
    finished: bool,
}

// The FFmpeg contexts carry raw pointers but have no thread affinity; the
// sink is only driven behind the session's lock, never concurrently.
unsafe impl Send for EncoderSink {}

struct VideoLane {
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
}

struct AudioLane {
    encoder: ffmpeg::encoder::Audio,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    frame_size: usize,
    /// Mono samples waiting to fill the next full encoder frame.
    pending: Vec<f32>,
    /// PTS (in samples at 48 kHz) of pending[0]; established by the first
    /// chunk's rebased timestamp.
    next_pts: Option<i64>,
}

// 90 kHz is the conventional MPEG tick rate; fine-grained enough that
// rebased nanosecond timestamps survive the conversion.
const VIDEO_TIME_BASE: (i32, i32) = (1, 90_000);

impl EncoderSink {
    pub fn open(config: &RecordingConfig, output_path: PathBuf) -> Result<Self, CaptureError> {
        ffmpeg::init().map_err(|e| CaptureError::ConfigRejected(format!("ffmpeg init: {e}")))?;

        let mut octx = ffmpeg::format::output(&output_path)
            .map_err(|e| CaptureError::ConfigRejected(format!("open output: {e}")))?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let video = VideoLane::declare(&mut octx, config, global_header)?;
        let audio = if config.capture_microphone {
            Some(AudioLane::declare(&mut octx, global_header)?)
        } else {
            None
        };

        Ok(Self {
            octx,
            output_path,
            video,
            audio,
            started: false,
            finished: false,
        })
    }

    fn write_packets(
        octx: &mut ffmpeg::format::context::Output,
        encoder: &mut impl PacketDrain,
        stream_index: usize,
        encoder_tb: ffmpeg::Rational,
    ) -> Result<(), CaptureError> {
        let stream_tb = octx
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_tb);

        let mut packet = ffmpeg::codec::packet::Packet::empty();
        while encoder.drain(&mut packet).is_ok() {
            packet.set_stream(stream_index);
            packet.rescale_ts(encoder_tb, stream_tb);
            packet
                .write_interleaved(octx)
                .map_err(|e| CaptureError::Stream(format!("write packet: {e}")))?;
        }
        Ok(())
    }
}

// receive_packet is the same call on both encoder flavours but they are
// distinct types in ffmpeg-next; a one-method trait keeps the drain loop
// shared.
trait PacketDrain {
    fn drain(&mut self, packet: &mut ffmpeg::codec::packet::Packet) -> Result<(), ffmpeg::Error>;
}

impl PacketDrain for ffmpeg::encoder::Video {
    fn drain(&mut self, packet: &mut ffmpeg::codec::packet::Packet) -> Result<(), ffmpeg::Error> {
        self.receive_packet(packet)
    }
}

impl PacketDrain for ffmpeg::encoder::Audio {
    fn drain(&mut self, packet: &mut ffmpeg::codec::packet::Packet) -> Result<(), ffmpeg::Error> {
        self.receive_packet(packet)
    }
}

impl VideoLane {
    fn declare(
        octx: &mut ffmpeg::format::context::Output,
        config: &RecordingConfig,
        global_header: bool,
    ) -> Result<Self, CaptureError> {
        let codec = find_h264_encoder()?;

        let stream_index = {
            let stream = octx
                .add_stream(codec)
                .map_err(|e| CaptureError::ConfigRejected(format!("add video stream: {e}")))?;
            stream.index()
        };

        let time_base = ffmpeg::Rational::new(VIDEO_TIME_BASE.0, VIDEO_TIME_BASE.1);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| CaptureError::ConfigRejected(format!("video encoder context: {e}")))?;

        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(config.fps as i32, 1)));
        encoder.set_bit_rate(config.bitrate() as usize);
        encoder.set_gop(config.keyframe_interval());
        encoder.set_max_b_frames(0);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("profile", "high");
        opts.set("preset", "veryfast");
        let encoder = encoder
            .open_with(opts)
            .map_err(|e| CaptureError::ConfigRejected(format!("open H.264 encoder: {e}")))?;

        octx.stream_mut(stream_index)
            .ok_or_else(|| CaptureError::ConfigRejected("video stream vanished".into()))?
            .set_parameters(&encoder);

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::BGRA,
            config.width,
            config.height,
            ffmpeg::format::Pixel::YUV420P,
            config.width,
            config.height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| CaptureError::ConfigRejected(format!("create scaler: {e}")))?;

        Ok(Self {
            encoder,
            scaler,
            stream_index,
            time_base,
            width: config.width,
            height: config.height,
        })
    }

    fn encode(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
        frame: &VideoFrame,
    ) -> Result<(), CaptureError> {
        if frame.width != self.width || frame.height != self.height {
            // Captured pixels must match the declared encoder dimensions or
            // the output scrambles; the capture framework owns DPI scaling.
            return Err(CaptureError::Stream(format!(
                "frame size {}x{} does not match encoder {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let row_bytes = self.width as usize * 4;
        let src_stride = frame.stride.max(row_bytes);
        if frame.data.len() < src_stride * (self.height as usize - 1) + row_bytes {
            return Err(CaptureError::Stream(format!(
                "frame buffer of {} bytes too small for {}x{} (stride {})",
                frame.data.len(),
                self.width,
                self.height,
                src_stride
            )));
        }

        let mut bgra =
            ffmpeg::util::frame::video::Video::new(ffmpeg::format::Pixel::BGRA, self.width, self.height);
        let dst_stride = bgra.stride(0);
        let data = bgra.data_mut(0);
        for y in 0..self.height as usize {
            let src = &frame.data[y * src_stride..y * src_stride + row_bytes];
            data[y * dst_stride..y * dst_stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv =
            ffmpeg::util::frame::video::Video::new(ffmpeg::format::Pixel::YUV420P, self.width, self.height);
        self.scaler
            .run(&bgra, &mut yuv)
            .map_err(|e| CaptureError::Stream(format!("pixel conversion: {e}")))?;

        yuv.set_pts(Some(nanos_to_tb(frame.pts, self.time_base)));

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| CaptureError::Stream(format!("encode frame: {e}")))?;

        EncoderSink::write_packets(octx, &mut self.encoder, self.stream_index, self.time_base)
    }

    fn flush(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<(), CaptureError> {
        self.encoder
            .send_eof()
            .map_err(|e| CaptureError::Finalize(format!("video eof: {e}")))?;
        EncoderSink::write_packets(octx, &mut self.encoder, self.stream_index, self.time_base)
            .map_err(|e| CaptureError::Finalize(e.to_string()))
    }
}

impl AudioLane {
    fn declare(
        octx: &mut ffmpeg::format::context::Output,
        global_header: bool,
    ) -> Result<Self, CaptureError> {
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC)
            .ok_or_else(|| CaptureError::ConfigRejected("AAC encoder not found".into()))?;

        let stream_index = {
            let stream = octx
                .add_stream(codec)
                .map_err(|e| CaptureError::ConfigRejected(format!("add audio stream: {e}")))?;
            stream.index()
        };

        let time_base = ffmpeg::Rational::new(1, AUDIO_SAMPLE_RATE as i32);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| CaptureError::ConfigRejected(format!("audio encoder context: {e}")))?;

        encoder.set_rate(AUDIO_SAMPLE_RATE as i32);
        encoder.set_channel_layout(ffmpeg::channel_layout::ChannelLayout::MONO);
        encoder.set_format(ffmpeg::format::Sample::F32(
            ffmpeg::format::sample::Type::Planar,
        ));
        encoder.set_bit_rate(AUDIO_BITRATE);
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| CaptureError::ConfigRejected(format!("open AAC encoder: {e}")))?;

        octx.stream_mut(stream_index)
            .ok_or_else(|| CaptureError::ConfigRejected("audio stream vanished".into()))?
            .set_parameters(&encoder);

        let frame_size = match encoder.frame_size() {
            0 => 1024,
            n => n as usize,
        };

        Ok(Self {
            encoder,
            stream_index,
            time_base,
            frame_size,
            pending: Vec::new(),
            next_pts: None,
        })
    }

    fn append(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
        chunk: &AudioChunk,
    ) -> Result<(), CaptureError> {
        if chunk.sample_rate != AUDIO_SAMPLE_RATE {
            return Err(CaptureError::Stream(format!(
                "audio chunk at {} Hz, pipeline requires {} Hz",
                chunk.sample_rate, AUDIO_SAMPLE_RATE
            )));
        }
        if chunk.channels == 0 {
            return Ok(());
        }

        if self.next_pts.is_none() {
            self.next_pts = Some(nanos_to_tb(chunk.pts, self.time_base));
        }

        // Downmix to mono by averaging channels.
        let ch = chunk.channels as usize;
        if ch == 1 {
            self.pending.extend_from_slice(&chunk.samples);
        } else {
            self.pending.extend(
                chunk
                    .samples
                    .chunks_exact(ch)
                    .map(|frame| frame.iter().sum::<f32>() / ch as f32),
            );
        }

        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let frame_samples = std::mem::replace(&mut self.pending, rest);
            self.encode_frame(octx, &frame_samples)?;
        }
        Ok(())
    }

    fn encode_frame(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
        samples: &[f32],
    ) -> Result<(), CaptureError> {
        let mut frame = ffmpeg::util::frame::audio::Audio::new(
            ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Planar),
            self.frame_size,
            ffmpeg::channel_layout::ChannelLayout::MONO,
        );
        frame.set_rate(AUDIO_SAMPLE_RATE);

        let plane = frame.plane_mut::<f32>(0);
        plane[..samples.len()].copy_from_slice(samples);
        for slot in plane[samples.len()..].iter_mut() {
            *slot = 0.0;
        }

        let pts = self.next_pts.unwrap_or(0);
        frame.set_pts(Some(pts));
        self.next_pts = Some(pts + self.frame_size as i64);

        self.encoder
            .send_frame(&frame)
            .map_err(|e| CaptureError::Stream(format!("encode audio: {e}")))?;

        EncoderSink::write_packets(octx, &mut self.encoder, self.stream_index, self.time_base)
    }

    fn flush(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<(), CaptureError> {
        // Pad the trailing partial frame with silence rather than dropping
        // up to ~21 ms from the end of the take.
        if !self.pending.is_empty() {
            let remainder = std::mem::take(&mut self.pending);
            self.encode_frame(octx, &remainder)
                .map_err(|e| CaptureError::Finalize(e.to_string()))?;
        }
        self.encoder
            .send_eof()
            .map_err(|e| CaptureError::Finalize(format!("audio eof: {e}")))?;
        EncoderSink::write_packets(octx, &mut self.encoder, self.stream_index, self.time_base)
            .map_err(|e| CaptureError::Finalize(e.to_string()))
    }
}

impl MediaSink for EncoderSink {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.started {
            return Ok(());
        }
        self.octx
            .write_header()
            .map_err(|e| CaptureError::ConfigRejected(format!("write MP4 header: {e}")))?;
        self.started = true;
        debug!(
            "encoder sink started: {:?} ({} audio)",
            self.output_path,
            if self.audio.is_some() { "with" } else { "no" }
        );
        Ok(())
    }

    fn append_video(&mut self, frame: &VideoFrame) -> Result<(), CaptureError> {
        if !self.started || self.finished {
            return Err(CaptureError::NotRecording);
        }
        self.video.encode(&mut self.octx, frame)
    }

    fn append_audio(&mut self, chunk: &AudioChunk) -> Result<(), CaptureError> {
        if !self.started || self.finished {
            return Err(CaptureError::NotRecording);
        }
        match self.audio.as_mut() {
            Some(lane) => lane.append(&mut self.octx, chunk),
            None => {
                warn!("audio sample on a video-only recording, dropping");
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<PathBuf, CaptureError> {
        if self.finished {
            return Ok(self.output_path.clone());
        }
        if !self.started {
            return Err(CaptureError::NotRecording);
        }

        self.video.flush(&mut self.octx)?;
        if let Some(lane) = self.audio.as_mut() {
            lane.flush(&mut self.octx)?;
        }

        self.octx
            .write_trailer()
            .map_err(|e| CaptureError::Finalize(format!("write MP4 trailer: {e}")))?;
        self.finished = true;
        Ok(self.output_path.clone())
    }
}

/// Prefer the platform's hardware H.264 encoder, fall back to the default
/// software encoder.
fn find_h264_encoder() -> Result<ffmpeg::Codec, CaptureError> {
    #[cfg(target_os = "macos")]
    const HARDWARE_CANDIDATES: &[&str] = &["h264_videotoolbox"];
    #[cfg(target_os = "windows")]
    const HARDWARE_CANDIDATES: &[&str] = &["h264_mf", "h264_nvenc"];
    // Elsewhere the hardware paths need device contexts the sink does not
    // manage; software x264 is the dependable default.
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    const HARDWARE_CANDIDATES: &[&str] = &[];

    for name in HARDWARE_CANDIDATES {
        if let Some(codec) = ffmpeg::encoder::find_by_name(name) {
            debug!("using hardware H.264 encoder: {name}");
            return Ok(codec);
        }
    }

    ffmpeg::encoder::find(ffmpeg::codec::Id::H264)
        .ok_or_else(|| CaptureError::ConfigRejected("no H.264 encoder available".into()))
}

fn nanos_to_tb(nanos: i64, tb: ffmpeg::Rational) -> i64 {
    // pts_tb = nanos * den / (1e9 * num); num is always 1 here.
    let den = tb.denominator() as i128;
    let num = tb.numerator().max(1) as i128;
    ((nanos as i128 * den) / (1_000_000_000 * num)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_convert_to_90khz_ticks() {
        let tb = ffmpeg::Rational::new(1, 90_000);
        assert_eq!(nanos_to_tb(0, tb), 0);
        assert_eq!(nanos_to_tb(1_000_000_000, tb), 90_000);
        // One 30 fps frame interval.
        assert_eq!(nanos_to_tb(33_333_333, tb), 2_999);
    }

    #[test]
    fn nanos_convert_to_sample_ticks() {
        let tb = ffmpeg::Rational::new(1, 48_000);
        assert_eq!(nanos_to_tb(1_000_000_000, tb), 48_000);
        assert_eq!(nanos_to_tb(500_000_000, tb), 24_000);
    }
}
