//! Decoded frames.
//!
//! Decoders produce [`Frame`] values: either a [`VideoFrame`] of tightly
//! packed pixel planes or an [`AudioFrame`] of interleaved samples. Both
//! carry a presentation timestamp already rescaled to a [`Duration`].

use std::{str::FromStr, time::Duration};

use ffmpeg_next::format::{Pixel, Sample, sample::Type as SampleType};

/// Pixel layout a video decoder can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Planar 4:2:0 YUV, three planes. This is the default.
    #[default]
    Yuv420p,
    /// Packed 8-bit RGB, one plane (24 bpp).
    Rgb24,
    /// Packed 8-bit RGBA, one plane (32 bpp).
    Rgba,
}

impl PixelFormat {
    /// Map to the corresponding FFmpeg pixel format constant.
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Yuv420p => Pixel::YUV420P,
            PixelFormat::Rgb24 => Pixel::RGB24,
            PixelFormat::Rgba => Pixel::RGBA,
        }
    }

    /// Number of planes a frame in this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420p => 3,
            PixelFormat::Rgb24 | PixelFormat::Rgba => 1,
        }
    }

    /// Bytes per row and number of rows of plane `index` for a picture of
    /// the given size.
    pub fn plane_geometry(self, index: usize, width: u32, height: u32) -> (usize, usize) {
        let (width, height) = (width as usize, height as usize);
        match (self, index) {
            (PixelFormat::Yuv420p, 0) => (width, height),
            (PixelFormat::Yuv420p, _) => (width.div_ceil(2), height.div_ceil(2)),
            (PixelFormat::Rgb24, _) => (width * 3, height),
            (PixelFormat::Rgba, _) => (width * 4, height),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "yuv420p" | "yuv" | "i420" => Ok(PixelFormat::Yuv420p),
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            "rgba" | "rgba8" => Ok(PixelFormat::Rgba),
            other => Err(format!("unsupported pixel format: {other}")),
        }
    }
}

/// Interleaved sample layout an audio decoder can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Signed 16-bit integer samples.
    I16,
    /// 32-bit float samples. This is the default.
    #[default]
    F32,
}

impl SampleFormat {
    /// Map to the corresponding packed FFmpeg sample format.
    pub(crate) fn to_ffmpeg_sample(self) -> Sample {
        match self {
            SampleFormat::I16 => Sample::I16(SampleType::Packed),
            SampleFormat::F32 => Sample::F32(SampleType::Packed),
        }
    }

    /// Size of one sample of one channel, in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// One plane of pixel data. Rows are tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Pixel bytes, `stride * rows` long.
    pub data: Vec<u8>,
    /// Bytes per row.
    pub stride: usize,
}

/// A decoded picture ready for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Layout of `planes`.
    pub pixel_format: PixelFormat,
    /// Pixel planes, `pixel_format.plane_count()` of them.
    pub planes: Vec<Plane>,
    /// When the picture should be shown, in stream time.
    pub pts: Duration,
}

/// A block of decoded audio ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Layout of each sample in `samples`.
    pub sample_format: SampleFormat,
    /// Interleaved sample bytes in native endianness.
    pub samples: Vec<u8>,
    /// When the first sample should play, in stream time.
    pub pts: Duration,
}

impl AudioFrame {
    /// Number of samples per channel.
    pub fn sample_count(&self) -> usize {
        let frame_bytes = self.sample_format.bytes_per_sample() * self.channels.max(1) as usize;
        self.samples.len() / frame_bytes
    }

    /// Playback length of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.sample_rate as f64)
    }

    /// Samples converted to `f32`, interleaved.
    pub fn to_f32_samples(&self) -> Vec<f32> {
        match self.sample_format {
            SampleFormat::F32 => self
                .samples
                .chunks_exact(4)
                .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect(),
            SampleFormat::I16 => self
                .samples
                .chunks_exact(2)
                .map(|bytes| i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0)
                .collect(),
        }
    }
}

/// A decoded unit of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A decoded picture.
    Video(VideoFrame),
    /// A decoded block of audio.
    Audio(AudioFrame),
}

impl Frame {
    /// Presentation timestamp of the frame.
    pub fn pts(&self) -> Duration {
        match self {
            Frame::Video(frame) => frame.pts,
            Frame::Audio(frame) => frame.pts,
        }
    }
}
