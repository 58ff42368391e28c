//! Playback configuration.
//!
//! [`PlaybackOptions`] is a builder that threads output formats, the stop
//! token, progress reporting and pacing tunables into
//! [`PlaybackPipeline`](crate::PlaybackPipeline) without a long constructor.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use unspool::{CancellationToken, PixelFormat, PlaybackOptions};
//!
//! let token = CancellationToken::new();
//! let options = PlaybackOptions::new()
//!     .with_pixel_format(PixelFormat::Rgb24)
//!     .with_cancellation(token.clone())
//!     .with_wait_quantum(Duration::from_millis(5));
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::clock::{SystemTimeSource, TimeSource};
use crate::frame::{PixelFormat, SampleFormat};
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Options for one playback run.
///
/// A default-constructed value plays at real-time speed on the system clock,
/// lets the presentation sink choose its pixel format, and requests `f32`
/// audio.
#[derive(Clone)]
pub struct PlaybackOptions {
    /// Pixel format for decoded video. `None` defers to the sink.
    pub(crate) pixel_format: Option<PixelFormat>,
    /// Sample format requested from the audio device.
    pub(crate) sample_format: SampleFormat,
    /// Stop request shared with the caller.
    pub(crate) cancellation: CancellationToken,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Fire the progress callback every N presented frames.
    pub(crate) progress_interval: u64,
    /// Longest single sleep while waiting; bounds stop latency.
    pub(crate) wait_quantum: Duration,
    /// Delay before re-offering a frame the audio device refused.
    pub(crate) backpressure_retry_delay: Duration,
    /// Longest wait for the audio device to play out at end of stream.
    pub(crate) drain_timeout: Duration,
    /// Consecutive unreadable packets tolerated before giving up.
    pub(crate) max_consecutive_read_errors: u32,
    /// Clock used for pacing.
    pub(crate) time_source: Arc<dyn TimeSource>,
}

impl Debug for PlaybackOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PlaybackOptions")
            .field("pixel_format", &self.pixel_format)
            .field("sample_format", &self.sample_format)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("progress_interval", &self.progress_interval)
            .field("wait_quantum", &self.wait_quantum)
            .field("backpressure_retry_delay", &self.backpressure_retry_delay)
            .field("drain_timeout", &self.drain_timeout)
            .field("max_consecutive_read_errors", &self.max_consecutive_read_errors)
            .finish()
    }
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackOptions {
    /// Create options with default settings.
    ///
    /// Defaults: sink-chosen pixel format, `f32` audio, 10 ms wait quantum,
    /// 5 ms backpressure retry delay, 5 s drain timeout, 16 consecutive read
    /// errors, progress every 30 frames, system clock.
    pub fn new() -> Self {
        Self {
            pixel_format: None,
            sample_format: SampleFormat::F32,
            cancellation: CancellationToken::new(),
            progress: Arc::new(NoOpProgress),
            progress_interval: 30,
            wait_quantum: Duration::from_millis(10),
            backpressure_retry_delay: Duration::from_millis(5),
            drain_timeout: Duration::from_secs(5),
            max_consecutive_read_errors: 16,
            time_source: Arc::new(SystemTimeSource),
        }
    }

    /// Force the pixel format decoders produce and the surface is
    /// configured with.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Set the sample format requested from the audio device.
    #[must_use]
    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Share a stop token with the pipeline.
    ///
    /// Cancelling it makes the pipeline unwind to `Stopped` within one wait
    /// quantum.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames.max(1);
        self
    }

    /// Set the longest single sleep while waiting for a deadline or for
    /// device buffer space. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_wait_quantum(mut self, quantum: Duration) -> Self {
        self.wait_quantum = quantum.max(Duration::from_millis(1));
        self
    }

    /// Set the delay before retrying an audio frame refused with
    /// backpressure.
    #[must_use]
    pub fn with_backpressure_retry_delay(mut self, delay: Duration) -> Self {
        self.backpressure_retry_delay = delay;
        self
    }

    /// Set the longest wait for the audio device to play out at end of
    /// stream.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set how many consecutive unreadable packets are skipped before
    /// playback fails. Clamped to at least 1.
    #[must_use]
    pub fn with_max_consecutive_read_errors(mut self, count: u32) -> Self {
        self.max_consecutive_read_errors = count.max(1);
        self
    }

    /// Replace the clock used for pacing.
    #[must_use]
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// The stop token this run observes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
