//! Desktop window output (requires the `window` feature).
//!
//! [`WindowSink`] shows decoded pictures in a native window. Closing the
//! window or pressing Escape cancels the playback's [`CancellationToken`],
//! so the pipeline unwinds as if a stop had been requested.

use minifb::{Key, ScaleMode, Window, WindowOptions};

use crate::error::SinkError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::progress::CancellationToken;
use crate::sink::PresentationSink;

/// A [`PresentationSink`] backed by a native window.
///
/// Accepts packed RGB and RGBA frames.
pub struct WindowSink {
    title: String,
    cancellation: CancellationToken,
    window: Option<Window>,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    pixel_format: PixelFormat,
}

impl WindowSink {
    /// Create a sink. The window is opened by
    /// [`configure`](PresentationSink::configure).
    pub fn new(title: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            title: title.into(),
            cancellation,
            window: None,
            buffer: Vec::new(),
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Rgb24,
        }
    }
}

/// Cancel playback once the user closes the window or presses Escape.
fn observe_close(window: &Window, cancellation: &CancellationToken) {
    if !window.is_open() || window.is_key_down(Key::Escape) {
        if !cancellation.is_cancelled() {
            log::info!("Window closed; stopping playback");
        }
        cancellation.cancel();
    }
}

impl PresentationSink for WindowSink {
    fn preferred_format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    fn configure(
        &mut self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Result<(), SinkError> {
        if pixel_format == PixelFormat::Yuv420p {
            return Err(SinkError::UnsupportedFormat(
                "window output needs rgb24 or rgba frames".to_string(),
            ));
        }

        let (width, height) = (width as usize, height as usize);
        let options = WindowOptions {
            resize: true,
            scale_mode: ScaleMode::AspectRatioStretch,
            ..WindowOptions::default()
        };
        let mut window = Window::new(&self.title, width, height, options)
            .map_err(|error| SinkError::DeviceInit(error.to_string()))?;
        // Pacing is done by the pipeline.
        window.set_target_fps(0);

        log::debug!("Opened {width}x{height} window \"{}\"", self.title);
        self.buffer = vec![0; width * height];
        self.width = width;
        self.height = height;
        self.pixel_format = pixel_format;
        self.window = Some(window);
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SinkError> {
        let Some(window) = self.window.as_mut() else {
            return Err(SinkError::NotConfigured);
        };
        if frame.pixel_format != self.pixel_format {
            return Err(SinkError::UnsupportedFormat(format!(
                "frame is {:?}, window is {:?}",
                frame.pixel_format, self.pixel_format
            )));
        }
        let plane = frame
            .planes
            .first()
            .ok_or_else(|| SinkError::Device("frame has no pixel data".to_string()))?;

        let bytes_per_pixel = match frame.pixel_format {
            PixelFormat::Rgba => 4,
            _ => 3,
        };
        let columns = self.width.min(frame.width as usize);
        for (row_index, row) in plane
            .data
            .chunks(plane.stride.max(1))
            .take(self.height)
            .enumerate()
        {
            let target = &mut self.buffer[row_index * self.width..][..columns];
            for (pixel, source) in target.iter_mut().zip(row.chunks_exact(bytes_per_pixel)) {
                *pixel = (u32::from(source[0]) << 16)
                    | (u32::from(source[1]) << 8)
                    | u32::from(source[2]);
            }
        }

        window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|error| SinkError::Device(error.to_string()))?;

        observe_close(window, &self.cancellation);
        Ok(())
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        if self.window.take().is_some() {
            log::debug!("Closed window \"{}\"", self.title);
        }
    }
}
