//! Orchestrator lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// Composing documents and building images.
    Preparing,
    /// Starting services.
    Launching,
    /// Waiting for health targets.
    Probing,
    /// Every target was satisfied.
    Ready,
    /// At least one target never passed.
    Degraded,
}

impl OrchestratorState {
    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Whether `next` directly follows this state.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Preparing)
                | (Self::Preparing, Self::Launching | Self::Degraded)
                | (Self::Launching, Self::Probing)
                | (Self::Probing, Self::Ready | Self::Degraded)
        )
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Launching => "launching",
            Self::Probing => "probing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
