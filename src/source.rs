//! Opening demuxers and decoders.
//!
//! [`MediaSource`] is the seam between the pipeline and the media library:
//! the pipeline asks it for a demuxer, then for one decoder per stream it
//! plays. [`FfmpegSource`] opens a local file with FFmpeg.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use ffmpeg_next::codec::Parameters;

use crate::decoder::{Decoder, FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::demuxer::{Demuxer, FfmpegDemuxer};
use crate::error::{CodecError, OpenError};
use crate::frame::PixelFormat;
use crate::packet::StreamDescriptor;
use crate::sink::AudioSpec;

/// Opens the demuxer and per-stream decoders for one playback run.
pub trait MediaSource {
    /// Open the container.
    fn open_demuxer(&mut self) -> Result<Box<dyn Demuxer>, OpenError>;

    /// Open a decoder for a video stream of the demuxer returned by
    /// [`open_demuxer`](MediaSource::open_demuxer).
    fn open_video_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: PixelFormat,
    ) -> Result<Box<dyn Decoder>, CodecError>;

    /// Open a decoder for an audio stream, producing frames matching
    /// `output`.
    fn open_audio_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: AudioSpec,
    ) -> Result<Box<dyn Decoder>, CodecError>;
}

/// FFmpeg-backed [`MediaSource`] for a local file.
pub struct FfmpegSource {
    path: PathBuf,
    /// Codec parameters captured from the open demuxer, by stream index.
    parameters: Vec<Parameters>,
}

impl Debug for FfmpegSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegSource")
            .field("path", &self.path)
            .field("streams", &self.parameters.len())
            .finish()
    }
}

impl FfmpegSource {
    /// Create a source for the file at `path`. Nothing is opened yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            parameters: Vec::new(),
        }
    }

    /// Path this source plays.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parameters_for(&self, stream: &StreamDescriptor) -> Result<Parameters, CodecError> {
        self.parameters
            .get(stream.index)
            .cloned()
            .ok_or_else(|| CodecError::InitFailed {
                stream_index: stream.index,
                reason: "stream does not belong to the open container".to_string(),
            })
    }
}

impl MediaSource for FfmpegSource {
    fn open_demuxer(&mut self) -> Result<Box<dyn Demuxer>, OpenError> {
        let demuxer = FfmpegDemuxer::open(&self.path)?;
        self.parameters = demuxer.codec_parameters();
        Ok(Box::new(demuxer))
    }

    fn open_video_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: PixelFormat,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        let parameters = self.parameters_for(stream)?;
        Ok(Box::new(FfmpegVideoDecoder::open(stream, parameters, output)?))
    }

    fn open_audio_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: AudioSpec,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        let parameters = self.parameters_for(stream)?;
        Ok(Box::new(FfmpegAudioDecoder::open(stream, parameters, output)?))
    }
}
