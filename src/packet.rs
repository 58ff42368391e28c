//! Encoded packets and stream descriptors.
//!
//! A [`Packet`] is one unit of encoded data read from the container, tagged
//! with the stream it belongs to and its presentation timestamp in that
//! stream's [`TimeBase`]. A [`StreamDescriptor`] is the read-only metadata
//! for one stream, captured when the demuxer opens.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

use serde::Serialize;

/// Fallback time base used when a stream reports a zero denominator.
const FALLBACK_DENOMINATOR: i32 = 90_000;

/// The unit in which a stream's timestamps are expressed, as a fraction of
/// a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeBase {
    /// Numerator of the fraction.
    pub numerator: i32,
    /// Denominator of the fraction.
    pub denominator: i32,
}

impl TimeBase {
    /// Create a time base of `numerator / denominator` seconds.
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Rescale a timestamp in this time base to a [`Duration`].
    ///
    /// Negative timestamps clamp to zero.
    pub fn to_duration(self, timestamp: i64) -> Duration {
        let (numerator, denominator) = if self.denominator == 0 {
            (1, FALLBACK_DENOMINATOR)
        } else {
            (self.numerator, self.denominator)
        };
        let nanos = i128::from(timestamp) * i128::from(numerator) * 1_000_000_000
            / i128::from(denominator);
        Duration::from_nanos(u64::try_from(nanos.max(0)).unwrap_or(u64::MAX))
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(1, FALLBACK_DENOMINATOR)
    }
}

/// The kind of media a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video frames.
    Video,
    /// Audio samples.
    Audio,
    /// Anything else (subtitles, data, attachments). Never decoded.
    Other,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// Stream-specific layout information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamLayout {
    /// Coded picture size of a video stream.
    Video {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Native pixel format name as reported by the codec, if known.
        pixel_format: Option<String>,
    },
    /// Sample layout of an audio stream.
    Audio {
        /// Sample rate in hertz.
        sample_rate: u32,
        /// Number of channels.
        channels: u16,
    },
    /// No layout information.
    Other,
}

/// Read-only metadata for one stream in an opened container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    /// Index of the stream in the container.
    pub index: usize,
    /// What the stream carries.
    pub kind: MediaKind,
    /// Codec name (e.g. `"h264"`, `"aac"`).
    pub codec: String,
    /// Time base of the stream's timestamps.
    pub time_base: TimeBase,
    /// Dimensions or sample layout.
    pub layout: StreamLayout,
}

impl StreamDescriptor {
    /// Video dimensions, if this is a video stream.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.layout {
            StreamLayout::Video { width, height, .. } => Some((width, height)),
            _ => None,
        }
    }

    /// Audio sample rate and channel count, if this is an audio stream.
    pub fn sample_layout(&self) -> Option<(u32, u16)> {
        match self.layout {
            StreamLayout::Audio {
                sample_rate,
                channels,
            } => Some((sample_rate, channels)),
            _ => None,
        }
    }
}

/// One unit of encoded data read from the container.
///
/// Packets are moved into [`Decoder::submit`](crate::Decoder::submit) and
/// dropped after the decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Index of the stream this packet belongs to.
    pub stream_index: usize,
    /// Presentation timestamp in `time_base` units, if known.
    pub pts: Option<i64>,
    /// Decoding timestamp in `time_base` units, if known.
    pub dts: Option<i64>,
    /// Duration in `time_base` units (0 if unknown).
    pub duration: i64,
    /// Time base of the owning stream.
    pub time_base: TimeBase,
    /// Whether the packet is a keyframe / sync point.
    pub is_keyframe: bool,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Presentation timestamp as a [`Duration`], if the packet carries one.
    pub fn presentation_time(&self) -> Option<Duration> {
        self.pts.map(|pts| self.time_base.to_duration(pts))
    }
}
