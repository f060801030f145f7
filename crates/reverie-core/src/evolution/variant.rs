//! Candidate behavior variants.

use crate::error::{ReverieError, Result};
use serde::{Deserialize, Serialize};

/// Identifier of the unmodified behavior inside every search run.
pub const BASE_VARIANT_ID: &str = "base";

/// A candidate behavior produced during search.
///
/// Fitness is `None` until the replayer scores the variant, and can be assigned
/// exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub generation: u32,
    /// Zero (base), one (mutation) or two (crossover) parents
    pub parent_ids: Vec<String>,
    /// Behavior text
    pub payload: String,
    fitness: Option<f64>,
}

impl Variant {
    /// The generation-0 variant wrapping the current behavior.
    pub fn base(payload: impl Into<String>) -> Self {
        Self {
            id: BASE_VARIANT_ID.to_string(),
            generation: 0,
            parent_ids: Vec::new(),
            payload: payload.into(),
            fitness: None,
        }
    }

    /// A child of one or two parents.
    pub fn child(
        id: impl Into<String>,
        generation: u32,
        parent_ids: Vec<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            generation,
            parent_ids,
            payload: payload.into(),
            fitness: None,
        }
    }

    pub fn is_base(&self) -> bool {
        self.id == BASE_VARIANT_ID
    }

    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Fitness for ranking; unevaluated variants rank last.
    pub fn fitness_or_zero(&self) -> f64 {
        self.fitness.unwrap_or(0.0)
    }

    /// Records the replayer's score, clamped to [0, 1]. A non-finite score
    /// counts as 0. Fails if the variant was already scored.
    pub fn assign_fitness(&mut self, fitness: f64) -> Result<()> {
        if self.fitness.is_some() {
            return Err(ReverieError::internal(format!(
                "fitness of variant '{}' assigned twice",
                self.id
            )));
        }
        let fitness = if fitness.is_finite() {
            fitness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.fitness = Some(fitness);
        Ok(())
    }
}
