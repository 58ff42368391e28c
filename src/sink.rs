//! Output sinks.
//!
//! A [`PresentationSink`] is the surface decoded pictures are blitted to; an
//! [`AudioSink`] is the device decoded samples are handed to. The pipeline
//! drives both from a single thread and never calls them concurrently.
//!
//! Pacing is not a sink concern: the pipeline waits for each frame's
//! deadline before calling [`PresentationSink::present`], and the audio
//! device paces itself through its own buffer, signalling
//! [`SinkError::Backpressure`] when full.

use crate::error::SinkError;
use crate::frame::{AudioFrame, PixelFormat, SampleFormat, VideoFrame};

/// Sample layout an audio device is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSpec {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Layout of each sample.
    pub sample_format: SampleFormat,
}

/// A surface that displays decoded pictures.
pub trait PresentationSink {
    /// Pixel format the sink would like decoders to produce.
    fn preferred_format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    /// Create the surface. Called once before the first `present`.
    ///
    /// # Errors
    ///
    /// [`SinkError::UnsupportedFormat`] if the sink cannot display
    /// `pixel_format`, [`SinkError::DeviceInit`] if the surface cannot be
    /// created.
    fn configure(
        &mut self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Result<(), SinkError>;

    /// Copy a frame onto the surface. Blocks only for the copy.
    fn present(&mut self, frame: &VideoFrame) -> Result<(), SinkError>;
}

/// A device that plays decoded audio.
pub trait AudioSink {
    /// Open the device, asking for `requested`.
    ///
    /// Returns the layout the device actually obtained, which may differ;
    /// frames handed to [`enqueue`](AudioSink::enqueue) must match it.
    fn configure(&mut self, requested: AudioSpec) -> Result<AudioSpec, SinkError>;

    /// Hand a frame to the device buffer without blocking.
    ///
    /// # Errors
    ///
    /// [`SinkError::Backpressure`] if the buffer has no room for the frame
    /// right now; retry later with the same frame. A sink may take part of a
    /// frame larger than its whole buffer and resume on the retry.
    fn enqueue(&mut self, frame: &AudioFrame) -> Result<(), SinkError>;

    /// Whether everything enqueued so far has been played out.
    fn is_idle(&self) -> bool {
        true
    }
}

/// A [`PresentationSink`] that displays nothing.
///
/// Used for decode and pacing runs without a display, and by the binary
/// when built without the `window` feature.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    format: Option<(u32, u32, PixelFormat)>,
    frames_presented: u64,
}

impl HeadlessSink {
    /// Create an unconfigured sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl PresentationSink for HeadlessSink {
    fn preferred_format(&self) -> PixelFormat {
        PixelFormat::Yuv420p
    }

    fn configure(
        &mut self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Result<(), SinkError> {
        log::debug!("Headless surface {width}x{height} {pixel_format:?}");
        self.format = Some((width, height, pixel_format));
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SinkError> {
        let (width, height, pixel_format) = self.format.ok_or(SinkError::NotConfigured)?;
        if frame.pixel_format != pixel_format {
            return Err(SinkError::UnsupportedFormat(format!(
                "frame is {:?}, surface is {pixel_format:?}",
                frame.pixel_format
            )));
        }
        log::trace!(
            "Presented {}x{} frame at {:?} on {width}x{height} surface",
            frame.width,
            frame.height,
            frame.pts,
        );
        self.frames_presented += 1;
        Ok(())
    }
}
