//! Playback state machine.
//!
//! ```text
//! Idle ─▶ Opening ─▶ Playing ─▶ Draining ─▶ Stopped
//!            │          │           │
//!            └──────────┴───────────┴──────▶ Failed
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Where a [`PlaybackPipeline`](crate::PlaybackPipeline) is in its
/// lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Opening the demuxer, decoders and sinks.
    Opening,
    /// Reading, decoding and presenting.
    Playing,
    /// End of input reached (or stop requested); flushing decoders.
    Draining,
    /// Finished cleanly. Terminal.
    Stopped,
    /// Finished with an unrecoverable error. Terminal.
    Failed,
}

impl PlaybackState {
    /// Whether moving from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: PlaybackState) -> bool {
        use PlaybackState::*;

        matches!(
            (self, target),
            (Idle, Opening)
                | (Opening, Playing)
                | (Opening, Failed)
                | (Playing, Playing)
                | (Playing, Draining)
                | (Playing, Failed)
                | (Draining, Stopped)
                | (Draining, Failed)
        )
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Failed)
    }

    /// Human-readable name.
    pub fn description(self) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Opening => "Opening",
            PlaybackState::Playing => "Playing",
            PlaybackState::Draining => "Draining",
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Failed => "Failed",
        }
    }
}

impl Display for PlaybackState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.description())
    }
}
