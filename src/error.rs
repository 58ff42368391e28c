//! Error types for the `unspool` crate.
//!
//! Each stage of playback has its own error kind so the pipeline can decide,
//! per failure, whether to skip and continue or to stop:
//!
//! - [`OpenError`]: container level, fatal to startup.
//! - [`ReadError`]: per packet read; `InvalidData` is skippable.
//! - [`CodecError`]: per stream; fatal for video, degrades audio.
//! - [`DecodeError`]: per packet; `InvalidData` is skippable, `FatalState`
//!   ends the stream.
//! - [`SinkError`]: `Backpressure` is retried, everything else is fatal.
//!
//! [`PlaybackError`] wraps these with the stage that failed and is what
//! [`PlaybackPipeline::run`](crate::PlaybackPipeline::run) returns.

use std::path::PathBuf;

use thiserror::Error;

use crate::packet::MediaKind;

/// The input could not be opened.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpenError {
    /// Nothing exists at the given path.
    #[error("No such file: {}", .0.display())]
    NotFound(PathBuf),

    /// The container format was not recognised.
    #[error("Unsupported container format in {}: {reason}", path.display())]
    UnsupportedContainer {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying reason reported by the demuxing library.
        reason: String,
    },

    /// The container was recognised but its header or stream information
    /// could not be read.
    #[error("Corrupt container header in {}: {reason}", path.display())]
    CorruptHeader {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying reason reported by the demuxing library.
        reason: String,
    },

    /// The file opened but carries no video stream to play.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The media libraries failed to initialise.
    #[error("FFmpeg initialisation failed: {0}")]
    Init(String),
}

/// A packet could not be read from an open demuxer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The packet data was malformed; the next read may succeed.
    #[error("Invalid packet data: {0}")]
    InvalidData(String),

    /// The underlying input failed; no further packets can be read.
    #[error("Read failed: {0}")]
    Io(String),
}

impl ReadError {
    /// Whether playback can continue with the next packet.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReadError::InvalidData(_))
    }
}

/// A decoder could not be created for a stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// No decoder is available for the stream's codec.
    #[error("Unsupported codec '{codec}' for stream {stream_index}")]
    UnsupportedCodec {
        /// Index of the stream in the container.
        stream_index: usize,
        /// Codec name as reported by the container.
        codec: String,
    },

    /// A decoder exists but failed to open or configure its output.
    #[error("Decoder initialisation failed for stream {stream_index}: {reason}")]
    InitFailed {
        /// Index of the stream in the container.
        stream_index: usize,
        /// Underlying reason.
        reason: String,
    },
}

/// A packet could not be decoded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The packet was malformed. Skip it and carry on.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The decoder is in a state it cannot recover from.
    #[error("Decoder entered an unrecoverable state: {0}")]
    FatalState(String),
}

impl DecodeError {
    /// Whether the stream can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::InvalidData(_))
    }
}

/// A presentation or audio sink rejected an operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// The sink cannot handle the requested pixel or sample format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The output device or surface could not be created.
    #[error("Device initialisation failed: {0}")]
    DeviceInit(String),

    /// The device buffer is full; retry shortly.
    #[error("Device buffer is full")]
    Backpressure,

    /// The sink was used before `configure` succeeded.
    #[error("Sink is not configured")]
    NotConfigured,

    /// The device failed while accepting data.
    #[error("Device error: {0}")]
    Device(String),
}

/// The unified error returned by a failed playback run.
///
/// The display text names the stage that failed followed by the
/// underlying cause, suitable for printing directly to the user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlaybackError {
    /// Opening the input failed.
    #[error("Failed to open input: {0}")]
    Open(#[from] OpenError),

    /// A required decoder could not be created.
    #[error("Failed to open {kind} decoder: {source}")]
    Codec {
        /// Which kind of stream the decoder was for.
        kind: MediaKind,
        /// Underlying cause.
        source: CodecError,
    },

    /// Reading from the demuxer failed.
    #[error("Failed to read packet: {0}")]
    Read(ReadError),

    /// Too many consecutive unreadable packets.
    #[error("Giving up after {0} consecutive unreadable packets")]
    TooManyReadErrors(u32),

    /// A decoder failed irrecoverably.
    #[error("Failed to decode {kind} stream {stream_index}: {source}")]
    Decode {
        /// Which kind of stream was being decoded.
        kind: MediaKind,
        /// Index of the stream in the container.
        stream_index: usize,
        /// Underlying cause.
        source: DecodeError,
    },

    /// The presentation surface failed.
    #[error("Presentation failed: {0}")]
    Presentation(SinkError),

    /// The audio device failed after it was configured.
    #[error("Audio output failed: {0}")]
    Audio(SinkError),

    /// `run` was called on a pipeline that already ran.
    #[error("Pipeline has already been started")]
    AlreadyStarted,
}
