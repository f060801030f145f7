//! Evolution run parameters and results.

use super::variant::Variant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How per-session replay scores collapse into one variant fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessAggregation {
    /// Average-case improvement
    #[default]
    Mean,
    /// Robustness: the weakest session decides
    WorstCase,
}

impl FitnessAggregation {
    /// Aggregates session scores. An empty slice scores 0.
    pub fn aggregate(&self, scores: &[f64]) -> f64 {
        if scores.is_empty() {
            return 0.0;
        }
        match self {
            Self::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
            Self::WorstCase => scores.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// Parameters of one `evolve_skill` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionOptions {
    /// Upper bound on generations
    pub generations: u32,
    /// Children produced per generation
    pub population_size: usize,
    /// Variants kept as next generation's seed pool (base is always kept in addition)
    pub elite_count: usize,
    /// Stop after this many consecutive generations without improvement
    pub plateau_generations: u32,
    /// Fan-out limit for fitness evaluation within a generation
    pub max_concurrency: usize,
    /// Operator failures tolerated per generation before it proceeds with what it has
    pub max_operator_failures: usize,
    /// Number of failed sessions loaded as the replay corpus
    pub corpus_limit: usize,
    pub aggregation: FitnessAggregation,
}

impl Default for EvolutionOptions {
    fn default() -> Self {
        Self {
            generations: 5,
            population_size: 4,
            elite_count: 2,
            plateau_generations: 3,
            max_concurrency: 4,
            max_operator_failures: 3,
            corpus_limit: 20,
            aggregation: FitnessAggregation::Mean,
        }
    }
}

/// Summary of one completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u32,
    pub children_evaluated: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub operator_failures: usize,
    /// Whether this generation raised the best fitness seen so far
    pub improved: bool,
}

/// Outcome of one full search run.
///
/// `best_variant` is never worse than the base: the base variant stays in the
/// candidate pool for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionResult {
    pub behavior_name: String,
    pub behavior_path: PathBuf,
    pub best_variant: Variant,
    pub base_fitness: f64,
    pub improvement_percent: f64,
    pub generations_run: u32,
    pub history: Vec<GenerationStats>,
    pub corpus_size: usize,
    /// True when the run stopped on a cancellation request
    pub cancelled: bool,
}

impl EvolutionResult {
    pub fn best_fitness(&self) -> f64 {
        self.best_variant.fitness_or_zero()
    }

    /// True when some variant strictly beat the base.
    pub fn improved(&self) -> bool {
        !self.best_variant.is_base() && self.best_fitness() > self.base_fitness
    }
}

/// `max(0, (best - base) / base * 100)`.
///
/// A zero base has no relative scale, so the absolute gain is reported in
/// percentage points instead.
pub fn improvement_percent(base_fitness: f64, best_fitness: f64) -> f64 {
    if best_fitness <= base_fitness {
        return 0.0;
    }
    if base_fitness <= 0.0 {
        return best_fitness * 100.0;
    }
    ((best_fitness - base_fitness) / base_fitness * 100.0).max(0.0)
}
