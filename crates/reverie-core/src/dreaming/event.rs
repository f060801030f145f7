use serde::{Deserialize, Serialize};

/// Progress events published by the engine at phase and generation boundaries.
///
/// Consumers subscribe to the event bus instead of handing callbacks to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DreamEvent {
    CycleStarted {
        behavior: String,
    },
    /// Base behavior scored against the failure corpus.
    BaseEvaluated {
        behavior: String,
        base_fitness: f64,
        corpus_size: usize,
    },
    GenerationCompleted {
        behavior: String,
        generation: u32,
        best_fitness: f64,
        mean_fitness: f64,
    },
    PatchApplied {
        behavior: String,
        variant_id: String,
        improvement_percent: f64,
    },
    CycleCompleted {
        behavior: String,
        improvement_percent: f64,
        generations_run: u32,
        applied: bool,
    },
    CycleSkipped {
        behavior: String,
        reason: String,
    },
    CycleFailed {
        behavior: String,
        error: String,
    },
}

impl DreamEvent {
    pub fn behavior(&self) -> &str {
        match self {
            DreamEvent::CycleStarted { behavior }
            | DreamEvent::BaseEvaluated { behavior, .. }
            | DreamEvent::GenerationCompleted { behavior, .. }
            | DreamEvent::PatchApplied { behavior, .. }
            | DreamEvent::CycleCompleted { behavior, .. }
            | DreamEvent::CycleSkipped { behavior, .. }
            | DreamEvent::CycleFailed { behavior, .. } => behavior,
        }
    }
}
