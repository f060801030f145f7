//! Simulation collaborator interface and replay result types.

use crate::error::Result;
use crate::session::{Failure, Frame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome signals for one replayed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSignal {
    pub frame_index: usize,
    /// Action the candidate behavior took (human readable)
    pub action: String,
    /// Task-progress proxy in [0, 1]
    pub progress: f64,
    /// Fault kind if the step went wrong (e.g. "collision")
    #[serde(default)]
    pub fault: Option<String>,
}

/// Deterministic execution trace of a frame sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationRun {
    pub steps: Vec<StepSignal>,
}

impl SimulationRun {
    /// Returns true if the simulation faulted at `frame_index`.
    pub fn faulted_at(&self, frame_index: usize) -> bool {
        self.steps
            .iter()
            .any(|step| step.frame_index == frame_index && step.fault.is_some())
    }

    pub fn fault_count(&self) -> usize {
        self.steps.iter().filter(|step| step.fault.is_some()).count()
    }

    pub fn mean_progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.steps.iter().map(|step| step.progress).sum::<f64>() / self.steps.len() as f64
    }
}

/// Simulated world the replayer runs candidate behaviors in.
///
/// Given the same (frames, payload, seed) an implementation must return the
/// same run. An `Err` is treated as a crash of that single variant.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, frames: &[Frame], payload: &str, seed: u64) -> Result<SimulationRun>;
}

/// Scoring knobs for the replayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOptions {
    /// Weight of the recorded-failure avoidance term
    pub avoidance_weight: f64,
    /// Weight of the task-progress term
    pub progress_weight: f64,
    /// Simulation time limit per replay; `None` disables it
    pub timeout_ms: Option<u64>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            avoidance_weight: 0.7,
            progress_weight: 0.3,
            timeout_ms: Some(5_000),
        }
    }
}

/// Result of replaying one session against one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub session_id: String,
    pub variant_id: String,
    /// No recorded failure reproduced and the simulation did not crash
    pub success: bool,
    /// Score in [0, 1]
    pub fitness: f64,
    pub reproduced_failures: Vec<Failure>,
    pub trace: Vec<StepSignal>,
    /// Crash message when the simulation failed
    #[serde(default)]
    pub crash: Option<String>,
}
