//! Per-stream decoding.
//!
//! A [`Decoder`] owns the codec state of one stream. Packets go in through
//! [`submit`](Decoder::submit); frames come out through
//! [`receive_frame`](Decoder::receive_frame), possibly later than the packet
//! that produced them and possibly zero per packet. Submitting `None` flushes
//! the codec so it emits whatever it still buffers.
//!
//! [`FfmpegVideoDecoder`] converts pictures to a requested [`PixelFormat`] at
//! the stream's coded size; [`FfmpegAudioDecoder`] resamples to a negotiated
//! [`AudioSpec`].

use std::{collections::VecDeque, time::Duration};

use ffmpeg_next::{
    ChannelLayout, Error as FfmpegError,
    codec::{Parameters, context::Context as CodecContext},
    decoder::{Audio as AudioDecoder, Opened, Video as VideoDecoder},
    format::{Pixel, Sample},
    frame::{Audio as FfmpegAudioFrame, Video as FfmpegVideoFrame},
    software::{
        resampling::Context as ResamplingContext,
        scaling::{Context as ScalingContext, Flags as ScalingFlags},
    },
};

use crate::conversion::{copy_planes, copy_samples, packet_to_ffmpeg};
use crate::error::{CodecError, DecodeError};
use crate::frame::{AudioFrame, Frame, PixelFormat, VideoFrame};
use crate::packet::{Packet, StreamDescriptor, TimeBase};
use crate::sink::AudioSpec;

/// Codec state for one stream.
pub trait Decoder {
    /// Hand a packet to the codec, or `None` to flush at end of stream.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidData`] if the packet is malformed (the caller
    /// may skip it and continue), [`DecodeError::FatalState`] if the codec
    /// can no longer decode.
    fn submit(&mut self, packet: Option<Packet>) -> Result<(), DecodeError>;

    /// Take the next decoded frame, if one is ready.
    fn receive_frame(&mut self) -> Result<Option<Frame>, DecodeError>;
}

/// Send a packet (or end-of-stream) to an opened FFmpeg decoder.
fn send(decoder: &mut Opened, packet: Option<&Packet>) -> Result<(), FfmpegError> {
    match packet {
        Some(packet) => decoder.send_packet(&packet_to_ffmpeg(packet)),
        None => decoder.send_eof(),
    }
}

fn is_again(error: &FfmpegError) -> bool {
    matches!(error, FfmpegError::Other { errno } if *errno == ffmpeg_next::error::EAGAIN)
}

fn codec_error(stream: &StreamDescriptor, error: FfmpegError) -> CodecError {
    match error {
        FfmpegError::DecoderNotFound => CodecError::UnsupportedCodec {
            stream_index: stream.index,
            codec: stream.codec.clone(),
        },
        other => CodecError::InitFailed {
            stream_index: stream.index,
            reason: other.to_string(),
        },
    }
}

/// Best-effort timestamp of a decoded frame in stream time-base units.
fn frame_timestamp(frame: &ffmpeg_next::Frame) -> Option<i64> {
    frame.timestamp().or_else(|| frame.pts())
}

struct Scaler {
    context: ScalingContext,
    source: (Pixel, u32, u32),
}

/// FFmpeg-backed video [`Decoder`].
pub struct FfmpegVideoDecoder {
    decoder: VideoDecoder,
    scaler: Option<Scaler>,
    stream_index: usize,
    time_base: TimeBase,
    output_format: PixelFormat,
    output_width: u32,
    output_height: u32,
    decoded_frame: FfmpegVideoFrame,
    scaled_frame: FfmpegVideoFrame,
    last_pts: Duration,
    pending: VecDeque<Frame>,
    eof_sent: bool,
}

impl FfmpegVideoDecoder {
    /// Open a decoder for `stream` producing frames in `output_format`.
    ///
    /// # Errors
    ///
    /// [`CodecError::UnsupportedCodec`] if FFmpeg has no decoder for the
    /// codec, [`CodecError::InitFailed`] if the decoder fails to open.
    pub fn open(
        stream: &StreamDescriptor,
        parameters: Parameters,
        output_format: PixelFormat,
    ) -> Result<Self, CodecError> {
        log::debug!(
            "Opening video decoder for stream {} [{}] -> {:?}",
            stream.index,
            stream.codec,
            output_format,
        );
        let context =
            CodecContext::from_parameters(parameters).map_err(|error| codec_error(stream, error))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|error| codec_error(stream, error))?;

        let (output_width, output_height) = stream
            .dimensions()
            .filter(|&(width, height)| width > 0 && height > 0)
            .unwrap_or((decoder.width(), decoder.height()));

        Ok(Self {
            decoder,
            scaler: None,
            stream_index: stream.index,
            time_base: stream.time_base,
            output_format,
            output_width,
            output_height,
            decoded_frame: FfmpegVideoFrame::empty(),
            scaled_frame: FfmpegVideoFrame::empty(),
            last_pts: Duration::ZERO,
            pending: VecDeque::new(),
            eof_sent: false,
        })
    }

    /// Scale and convert the current `decoded_frame`.
    fn convert_current_frame(&mut self) -> Result<Frame, DecodeError> {
        let source = (
            self.decoded_frame.format(),
            self.decoded_frame.width(),
            self.decoded_frame.height(),
        );

        // The coded format or size can change mid-stream; rebuild the scaler
        // when it does.
        if self.scaler.as_ref().map(|scaler| scaler.source) != Some(source) {
            let context = ScalingContext::get(
                source.0,
                source.1,
                source.2,
                self.output_format.to_ffmpeg_pixel(),
                self.output_width,
                self.output_height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| DecodeError::FatalState(format!("Failed to create scaler: {error}")))?;
            self.scaler = Some(Scaler { context, source });
            self.scaled_frame = FfmpegVideoFrame::empty();
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(&self.decoded_frame, &mut self.scaled_frame)
                .map_err(|error| DecodeError::InvalidData(format!("Scaling failed: {error}")))?;
        }

        let pts = frame_timestamp(&self.decoded_frame)
            .map(|timestamp| self.time_base.to_duration(timestamp))
            .unwrap_or(self.last_pts);
        self.last_pts = pts;

        Ok(Frame::Video(VideoFrame {
            width: self.output_width,
            height: self.output_height,
            pixel_format: self.output_format,
            planes: copy_planes(
                &self.scaled_frame,
                self.output_format,
                self.output_width,
                self.output_height,
            ),
            pts,
        }))
    }

    fn receive_from_codec(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.decoder.receive_frame(&mut self.decoded_frame) {
            Ok(()) => self.convert_current_frame().map(Some),
            Err(FfmpegError::Eof) => Ok(None),
            Err(error) if is_again(&error) => Ok(None),
            Err(error) => Err(crate::ffmpeg::decode_error(error)),
        }
    }
}

impl Decoder for FfmpegVideoDecoder {
    fn submit(&mut self, packet: Option<Packet>) -> Result<(), DecodeError> {
        if packet.is_none() {
            if self.eof_sent {
                return Ok(());
            }
            self.eof_sent = true;
        }

        match send(&mut self.decoder, packet.as_ref()) {
            Ok(()) => Ok(()),
            Err(error) if is_again(&error) => {
                // The codec wants its output read first. Park what it has
                // and try once more.
                while let Some(frame) = self.receive_from_codec()? {
                    self.pending.push_back(frame);
                }
                send(&mut self.decoder, packet.as_ref()).map_err(crate::ffmpeg::decode_error)
            }
            Err(error) => {
                log::debug!("Video stream {}: submit failed: {error}", self.stream_index);
                Err(crate::ffmpeg::decode_error(error))
            }
        }
    }

    fn receive_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.pending.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => self.receive_from_codec(),
        }
    }
}

impl Drop for FfmpegVideoDecoder {
    fn drop(&mut self) {
        log::debug!("Closing video decoder for stream {}", self.stream_index);
    }
}

/// Output room beyond the rate-scaled input size, so each conversion also
/// empties whatever the resampler's filter still holds.
const RESAMPLER_HEADROOM: usize = 256;

/// Output samples per channel to allocate for `input_samples` converted
/// from `input_rate` to `output_rate`.
fn resampled_capacity(input_samples: usize, input_rate: u32, output_rate: u32) -> usize {
    let input_samples = u64::try_from(input_samples).unwrap_or(u64::MAX);
    let scaled = input_samples
        .saturating_mul(u64::from(output_rate))
        .div_ceil(u64::from(input_rate.max(1)));
    usize::try_from(scaled)
        .unwrap_or(usize::MAX)
        .saturating_add(RESAMPLER_HEADROOM)
}

struct Resampler {
    context: ResamplingContext,
    source: (Sample, ChannelLayout, u32),
}

/// FFmpeg-backed audio [`Decoder`].
pub struct FfmpegAudioDecoder {
    decoder: AudioDecoder,
    resampler: Option<Resampler>,
    stream_index: usize,
    time_base: TimeBase,
    output: AudioSpec,
    decoded_frame: FfmpegAudioFrame,
    next_pts: Option<Duration>,
    pending: VecDeque<Frame>,
    eof_sent: bool,
    resampler_drained: bool,
}

impl FfmpegAudioDecoder {
    /// Open a decoder for `stream` producing frames matching `output`.
    ///
    /// # Errors
    ///
    /// [`CodecError::UnsupportedCodec`] if FFmpeg has no decoder for the
    /// codec, [`CodecError::InitFailed`] if the decoder fails to open.
    pub fn open(
        stream: &StreamDescriptor,
        parameters: Parameters,
        output: AudioSpec,
    ) -> Result<Self, CodecError> {
        log::debug!(
            "Opening audio decoder for stream {} [{}] -> {:?}",
            stream.index,
            stream.codec,
            output,
        );
        let context =
            CodecContext::from_parameters(parameters).map_err(|error| codec_error(stream, error))?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|error| codec_error(stream, error))?;

        Ok(Self {
            decoder,
            resampler: None,
            stream_index: stream.index,
            time_base: stream.time_base,
            output,
            decoded_frame: FfmpegAudioFrame::empty(),
            next_pts: None,
            pending: VecDeque::new(),
            eof_sent: false,
            resampler_drained: false,
        })
    }

    fn convert_current_frame(&mut self) -> Result<Frame, DecodeError> {
        let layout = match self.decoded_frame.channel_layout() {
            layout if layout.is_empty() => {
                ChannelLayout::default(i32::from(self.decoded_frame.channels()))
            }
            layout => layout,
        };
        let source = (self.decoded_frame.format(), layout, self.decoded_frame.rate());

        if self.resampler.as_ref().map(|resampler| resampler.source) != Some(source) {
            let context = ResamplingContext::get(
                source.0,
                source.1,
                source.2,
                self.output.sample_format.to_ffmpeg_sample(),
                ChannelLayout::default(i32::from(self.output.channels)),
                self.output.sample_rate,
            )
            .map_err(|error| {
                DecodeError::FatalState(format!("Failed to create resampler: {error}"))
            })?;
            self.resampler = Some(Resampler { context, source });
        }

        let mut resampled_frame = self.output_frame(resampled_capacity(
            self.decoded_frame.samples(),
            source.2,
            self.output.sample_rate,
        ));
        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .context
                .run(&self.decoded_frame, &mut resampled_frame)
                .map_err(|error| DecodeError::InvalidData(format!("Resampling failed: {error}")))?;
        }

        let pts = frame_timestamp(&self.decoded_frame)
            .map(|timestamp| self.time_base.to_duration(timestamp));
        Ok(self.audio_frame(&resampled_frame, pts))
    }

    /// An allocated frame in the output layout with room for `samples`.
    fn output_frame(&self, samples: usize) -> FfmpegAudioFrame {
        FfmpegAudioFrame::new(
            self.output.sample_format.to_ffmpeg_sample(),
            samples,
            ChannelLayout::default(i32::from(self.output.channels)),
        )
    }

    fn audio_frame(&mut self, resampled: &FfmpegAudioFrame, pts: Option<Duration>) -> Frame {
        let bytes_per_frame =
            self.output.sample_format.bytes_per_sample() * usize::from(self.output.channels);
        let frame = AudioFrame {
            sample_rate: self.output.sample_rate,
            channels: self.output.channels,
            sample_format: self.output.sample_format,
            samples: copy_samples(resampled, bytes_per_frame),
            pts: pts.or(self.next_pts).unwrap_or(Duration::ZERO),
        };

        // Streams without timestamps are stamped by running sample count.
        self.next_pts = Some(frame.pts + frame.duration());

        Frame::Audio(frame)
    }

    /// Emit what the resampler still buffers once the codec is exhausted,
    /// one chunk per call.
    fn drain_resampler(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.resampler_drained {
            return Ok(None);
        }
        self.resampler_drained = true;

        let mut tail = self.output_frame(RESAMPLER_HEADROOM);
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        resampler
            .context
            .flush(&mut tail)
            .map_err(|error| DecodeError::InvalidData(format!("Resampler flush failed: {error}")))?;

        if tail.samples() == 0 {
            return Ok(None);
        }
        // A full chunk may leave more behind.
        self.resampler_drained = tail.samples() < RESAMPLER_HEADROOM;
        log::trace!(
            "Audio stream {}: {} samples flushed from the resampler",
            self.stream_index,
            tail.samples()
        );
        Ok(Some(self.audio_frame(&tail, None)))
    }

    fn receive_from_codec(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.decoder.receive_frame(&mut self.decoded_frame) {
            Ok(()) => self.convert_current_frame().map(Some),
            Err(FfmpegError::Eof) => self.drain_resampler(),
            Err(error) if is_again(&error) => Ok(None),
            Err(error) => Err(crate::ffmpeg::decode_error(error)),
        }
    }
}

impl Decoder for FfmpegAudioDecoder {
    fn submit(&mut self, packet: Option<Packet>) -> Result<(), DecodeError> {
        if packet.is_none() {
            if self.eof_sent {
                return Ok(());
            }
            self.eof_sent = true;
        }

        match send(&mut self.decoder, packet.as_ref()) {
            Ok(()) => Ok(()),
            Err(error) if is_again(&error) => {
                while let Some(frame) = self.receive_from_codec()? {
                    self.pending.push_back(frame);
                }
                send(&mut self.decoder, packet.as_ref()).map_err(crate::ffmpeg::decode_error)
            }
            Err(error) => {
                log::debug!("Audio stream {}: submit failed: {error}", self.stream_index);
                Err(crate::ffmpeg::decode_error(error))
            }
        }
    }

    fn receive_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.pending.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => self.receive_from_codec(),
        }
    }
}

impl Drop for FfmpegAudioDecoder {
    fn drop(&mut self) {
        log::debug!("Closing audio decoder for stream {}", self.stream_index);
    }
}
