//! Presentation pacing.
//!
//! [`PacingClock`] maps a frame's presentation timestamp to the wall-clock
//! instant it should appear at. The mapping is anchored once, at the first
//! frame actually about to be presented:
//!
//! ```text
//! deadline(ts) = start_wall_time + (ts - stream_time_origin)
//! ```
//!
//! Timestamps earlier than the origin map to the start instant, so the
//! function stays monotonic non-decreasing over every input.
//!
//! Time is read and slept through a [`TimeSource`] so that pacing can be
//! exercised against a virtual clock.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::progress::CancellationToken;

/// Where the clock reads the current time and how it sleeps.
pub trait TimeSource: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspend the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How a [`PacingClock::wait_until`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deadline was reached after waiting.
    Reached,
    /// The deadline had already passed by this much; nothing was waited.
    Late(Duration),
    /// A stop was requested before the deadline.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    start_wall_time: Instant,
    stream_time_origin: Duration,
}

/// Maps presentation timestamps to wall-clock deadlines.
pub struct PacingClock {
    time_source: Arc<dyn TimeSource>,
    anchor: Option<Anchor>,
}

impl PacingClock {
    /// Create an unanchored clock.
    pub fn new(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            time_source,
            anchor: None,
        }
    }

    /// Anchor `first_timestamp` to the current instant.
    ///
    /// # Panics
    ///
    /// If the clock was already started. Each playback run anchors exactly
    /// once.
    pub fn start(&mut self, first_timestamp: Duration) {
        assert!(
            self.anchor.is_none(),
            "PacingClock::start called twice in one playback run"
        );
        let start_wall_time = self.time_source.now();
        log::debug!("Pacing clock anchored at stream time {first_timestamp:?}");
        self.anchor = Some(Anchor {
            start_wall_time,
            stream_time_origin: first_timestamp,
        });
    }

    /// Whether [`start`](PacingClock::start) has been called.
    pub fn is_started(&self) -> bool {
        self.anchor.is_some()
    }

    /// The wall-clock instant at which `timestamp` is due.
    ///
    /// # Panics
    ///
    /// If the clock has not been started.
    pub fn deadline_for(&self, timestamp: Duration) -> Instant {
        let anchor = self
            .anchor
            .expect("PacingClock::deadline_for called before start");
        anchor.start_wall_time + timestamp.saturating_sub(anchor.stream_time_origin)
    }

    /// The current instant, as seen by this clock's time source.
    pub fn now(&self) -> Instant {
        self.time_source.now()
    }

    /// Sleep until `deadline`, in slices of at most `quantum`, checking
    /// `cancellation` between slices.
    ///
    /// A deadline already in the past returns [`WaitOutcome::Late`] without
    /// sleeping; late frames are presented immediately rather than skipped.
    pub fn wait_until(
        &self,
        deadline: Instant,
        cancellation: &CancellationToken,
        quantum: Duration,
    ) -> WaitOutcome {
        let now = self.time_source.now();
        if now > deadline {
            return WaitOutcome::Late(now - deadline);
        }

        let quantum = quantum.max(Duration::from_millis(1));
        loop {
            if cancellation.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let now = self.time_source.now();
            if now >= deadline {
                return WaitOutcome::Reached;
            }
            self.time_source.sleep((deadline - now).min(quantum));
        }
    }

    /// Sleep for `duration`, in slices of at most `quantum`, checking
    /// `cancellation` between slices. Returns `false` if cancelled.
    pub fn pause(
        &self,
        duration: Duration,
        cancellation: &CancellationToken,
        quantum: Duration,
    ) -> bool {
        let deadline = self.time_source.now() + duration;
        !matches!(
            self.wait_until(deadline, cancellation, quantum),
            WaitOutcome::Cancelled
        )
    }
}
