//! Evolutionary search domain types.

mod model;
mod mutation;
mod variant;

pub use model::{
    EvolutionOptions, EvolutionResult, FitnessAggregation, GenerationStats, improvement_percent,
};
pub use mutation::MutationStrategy;
pub use variant::{BASE_VARIANT_ID, Variant};
