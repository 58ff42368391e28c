//! FFmpeg library glue.
//!
//! One-time library initialisation, control over FFmpeg's own console
//! logging, and the mapping from raw FFmpeg errors onto the crate's
//! per-stage error kinds.
//!
//! FFmpeg's log output is separate from the Rust-side diagnostics emitted
//! through the [`log`](https://crates.io/crates/log) facade. By default it
//! prints warnings to stderr, which interleaves badly with a playing
//! window; [`set_ffmpeg_log_level`] quiets it.
//!
//! ```no_run
//! use unspool::FfmpegLogLevel;
//!
//! unspool::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::{path::Path, str::FromStr};

use ffmpeg_next::{Error as FfmpegError, util::log::Level};

use crate::error::{DecodeError, OpenError, ReadError};

/// FFmpeg internal log verbosity level, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            other => Err(format!("unsupported log level: {other}")),
        }
    }
}

/// Set FFmpeg's internal log verbosity.
///
/// This does **not** affect Rust-side `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Initialise the FFmpeg libraries. Safe to call more than once.
pub(crate) fn init() -> Result<(), OpenError> {
    ffmpeg_next::init().map_err(|error| OpenError::Init(error.to_string()))
}

/// Classify a failure from `avformat_open_input` / stream-info probing.
pub(crate) fn open_error(path: &Path, error: FfmpegError) -> OpenError {
    match error {
        FfmpegError::InvalidData | FfmpegError::DemuxerNotFound => {
            OpenError::UnsupportedContainer {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        }
        other => OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Classify a failure from `av_read_frame`. End-of-file is handled by the
/// caller before this is reached.
pub(crate) fn read_error(error: FfmpegError) -> ReadError {
    match error {
        FfmpegError::InvalidData => ReadError::InvalidData(error.to_string()),
        other => ReadError::Io(other.to_string()),
    }
}

/// Classify a failure from `avcodec_send_packet` / `avcodec_receive_frame`.
pub(crate) fn decode_error(error: FfmpegError) -> DecodeError {
    match error {
        FfmpegError::InvalidData => DecodeError::InvalidData(error.to_string()),
        other => DecodeError::FatalState(other.to_string()),
    }
}
