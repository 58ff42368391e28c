//! Playback progress reporting and stop requests.
//!
//! [`CancellationToken`] is how anything outside the playback loop (a
//! signal handler, a window close button, another thread) asks it to stop.
//! [`ProgressCallback`] observes playback position as frames are presented.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use unspool::{CancellationToken, PlaybackOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintPosition;
//!
//! impl ProgressCallback for PrintPosition {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?} / {:?}", info.position, info.duration);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PlaybackOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_progress(Arc::new(PrintPosition));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

/// A snapshot of playback progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Video frames presented so far.
    pub frames_presented: u64,
    /// Presentation timestamp of the most recent frame.
    pub position: Duration,
    /// Container duration, if known.
    pub duration: Option<Duration>,
    /// Completion percentage (0.0 – 100.0), if `duration` is known.
    pub percentage: Option<f32>,
}

impl ProgressInfo {
    pub(crate) fn new(
        frames_presented: u64,
        position: Duration,
        duration: Option<Duration>,
    ) -> Self {
        let percentage = duration
            .filter(|duration| !duration.is_zero())
            .map(|duration| {
                (position.as_secs_f32() / duration.as_secs_f32() * 100.0).min(100.0)
            });
        Self {
            frames_presented,
            position,
            duration,
            percentage,
        }
    }
}

/// Receives progress updates during playback.
///
/// Callbacks are infallible and cannot halt playback; use
/// [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called every [`PlaybackOptions::progress_interval`](crate::PlaybackOptions)
    /// presented frames.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative stop request backed by an [`AtomicBool`].
///
/// Clone it and call [`cancel`](CancellationToken::cancel) from any thread;
/// the playback loop observes it between packets and at least once per wait
/// quantum while suspended.
///
/// ```
/// use unspool::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a stop. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
