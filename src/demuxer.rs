//! Container demuxing.
//!
//! A [`Demuxer`] turns an opened container into a forward-only sequence of
//! encoded [`Packet`]s. [`FfmpegDemuxer`] is the FFmpeg-backed
//! implementation.
//!
//! # Example
//!
//! ```no_run
//! use unspool::{Demuxer, FfmpegDemuxer, OpenError};
//!
//! let mut demuxer = FfmpegDemuxer::open("input.mp4")?;
//! for stream in demuxer.streams() {
//!     println!("#{} {} [{}]", stream.index, stream.kind, stream.codec);
//! }
//! while let Ok(Some(packet)) = demuxer.read_packet() {
//!     println!("stream {} pts {:?}", packet.stream_index, packet.pts);
//! }
//! # Ok::<(), OpenError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet as FfmpegPacket,
    codec::{Parameters, context::Context as CodecContext},
    format::context::Input,
    media::Type,
};

use crate::conversion::packet_from_ffmpeg;
use crate::error::{OpenError, ReadError};
use crate::packet::{MediaKind, Packet, StreamDescriptor, StreamLayout, TimeBase};

/// A source of encoded packets.
pub trait Demuxer {
    /// Metadata for every stream in the container, fixed after open.
    fn streams(&self) -> &[StreamDescriptor];

    /// The stream the container prefers for `kind`, if any.
    ///
    /// Defaults to the first stream of that kind.
    fn best_stream(&self, kind: MediaKind) -> Option<&StreamDescriptor> {
        self.streams().iter().find(|stream| stream.kind == kind)
    }

    /// Total duration of the container, if known.
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` once the end of the container is reached; further
    /// calls keep returning `Ok(None)`.
    fn read_packet(&mut self) -> Result<Option<Packet>, ReadError>;
}

/// FFmpeg-backed [`Demuxer`].
///
/// Owns the format context; the underlying file handle is closed when the
/// demuxer is dropped.
pub struct FfmpegDemuxer {
    input_context: Input,
    streams: Vec<StreamDescriptor>,
    best_video: Option<usize>,
    best_audio: Option<usize>,
    duration: Option<Duration>,
    path: PathBuf,
    finished: bool,
}

impl Debug for FfmpegDemuxer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegDemuxer")
            .field("path", &self.path)
            .field("streams", &self.streams)
            .field("best_video", &self.best_video)
            .field("best_audio", &self.best_audio)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl FfmpegDemuxer {
    /// Open a container file and read its stream information.
    ///
    /// # Errors
    ///
    /// - [`OpenError::NotFound`] if nothing exists at `path`.
    /// - [`OpenError::UnsupportedContainer`] if FFmpeg cannot identify the
    ///   format.
    /// - [`OpenError::CorruptHeader`] if the header or stream information
    ///   cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let path = path.as_ref();
        log::debug!("Opening container: {}", path.display());

        if !path.exists() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }

        crate::ffmpeg::init()?;

        let input_context = ffmpeg_next::format::input(&path)
            .map_err(|error| crate::ffmpeg::open_error(path, error))?;

        let streams = input_context.streams().map(describe_stream).collect();
        let best_video = input_context
            .streams()
            .best(Type::Video)
            .map(|stream| stream.index());
        let best_audio = input_context
            .streams()
            .best(Type::Audio)
            .map(|stream| stream.index());

        let duration_microseconds = input_context.duration();
        let duration = (duration_microseconds > 0)
            .then(|| Duration::from_micros(duration_microseconds as u64));

        log::debug!(
            "Opened {} ({} streams, best video {:?}, best audio {:?})",
            input_context.format().name(),
            input_context.nb_streams(),
            best_video,
            best_audio,
        );

        Ok(Self {
            input_context,
            streams,
            best_video,
            best_audio,
            duration,
            path: path.to_path_buf(),
            finished: false,
        })
    }

    /// Path the demuxer was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detached copies of every stream's codec parameters, by stream index.
    ///
    /// The copies do not keep the format context alive.
    pub(crate) fn codec_parameters(&self) -> Vec<Parameters> {
        self.input_context
            .streams()
            .map(|stream| stream.parameters().clone())
            .collect()
    }

    fn time_base(&self, stream_index: usize) -> TimeBase {
        self.streams
            .get(stream_index)
            .map(|stream| stream.time_base)
            .unwrap_or_default()
    }
}

impl Demuxer for FfmpegDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn best_stream(&self, kind: MediaKind) -> Option<&StreamDescriptor> {
        let index = match kind {
            MediaKind::Video => self.best_video,
            MediaKind::Audio => self.best_audio,
            MediaKind::Other => None,
        }?;
        self.streams.get(index)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, ReadError> {
        if self.finished {
            return Ok(None);
        }

        let mut packet = FfmpegPacket::empty();
        match packet.read(&mut self.input_context) {
            Ok(()) => {
                let time_base = self.time_base(packet.stream());
                Ok(Some(packet_from_ffmpeg(&packet, time_base)))
            }
            Err(FfmpegError::Eof) => {
                log::debug!("End of container: {}", self.path.display());
                self.finished = true;
                Ok(None)
            }
            Err(error) => Err(crate::ffmpeg::read_error(error)),
        }
    }
}

impl Drop for FfmpegDemuxer {
    fn drop(&mut self) {
        log::debug!("Closing container: {}", self.path.display());
    }
}

/// Capture read-only metadata for one stream.
fn describe_stream(stream: ffmpeg_next::format::stream::Stream<'_>) -> StreamDescriptor {
    let index = stream.index();
    let parameters = stream.parameters();
    let medium = parameters.medium();
    let codec = parameters.id().name().to_string();
    let time_base = TimeBase::from(stream.time_base());

    let kind = match medium {
        Type::Video => MediaKind::Video,
        Type::Audio => MediaKind::Audio,
        _ => MediaKind::Other,
    };

    // Dimensions and sample layout are read through a throwaway decoder,
    // dropped before the stream is played.
    let layout = CodecContext::from_parameters(parameters)
        .ok()
        .and_then(|context| {
            let decoder = context.decoder();
            match kind {
                MediaKind::Video => decoder.video().ok().map(|video| {
                    let pixel_format = format!("{:?}", video.format());
                    StreamLayout::Video {
                        width: video.width(),
                        height: video.height(),
                        pixel_format: (pixel_format != "None").then_some(pixel_format),
                    }
                }),
                MediaKind::Audio => decoder.audio().ok().map(|audio| StreamLayout::Audio {
                    sample_rate: audio.rate(),
                    channels: audio.channels(),
                }),
                MediaKind::Other => None,
            }
        })
        .unwrap_or(StreamLayout::Other);

    StreamDescriptor {
        index,
        kind,
        codec,
        time_base,
        layout,
    }
}
