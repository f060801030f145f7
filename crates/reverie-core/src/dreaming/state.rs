//! Per-behavior orchestrator state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the orchestrator is for one behavior.
///
/// `Idle -> Evaluating -> {Idle | Evolving -> {Idle | Applying -> Idle}}`.
/// Any error returns the behavior to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamingState {
    #[default]
    Idle,
    /// Counting failure evidence
    Evaluating,
    /// Search in flight
    Evolving,
    /// Writing the best variant back
    Applying,
}

impl DreamingState {
    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: DreamingState) -> bool {
        use DreamingState::*;
        matches!(
            (self, next),
            (Idle, Evaluating)
                | (Evaluating, Idle)
                | (Evaluating, Evolving)
                | (Evolving, Idle)
                | (Evolving, Applying)
                | (Applying, Idle)
        )
    }
}

impl fmt::Display for DreamingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DreamingState::Idle => "idle",
            DreamingState::Evaluating => "evaluating",
            DreamingState::Evolving => "evolving",
            DreamingState::Applying => "applying",
        };
        f.write_str(label)
    }
}
