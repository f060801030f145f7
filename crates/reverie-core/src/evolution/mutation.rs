//! Pluggable variation operators.

use super::variant::Variant;
use crate::error::Result;
use async_trait::async_trait;

/// Produces child behavior payloads from parents.
///
/// Implementations may be purely local (structured parameter perturbation) or
/// call an external inference service. A failure should be reported as
/// `ReverieError::InferenceUnavailable`; the search then falls back to its
/// deterministic fallback operator.
///
/// The `seed` is fixed per (behavior, generation, child slot), so a
/// deterministic operator yields reproducible runs.
#[async_trait]
pub trait MutationStrategy: Send + Sync {
    /// Short operator name used in logs.
    fn name(&self) -> &str;

    /// Returns the payload of a child derived from a single parent.
    async fn mutate(&self, parent: &Variant, seed: u64) -> Result<String>;

    /// Returns the payload of a child combining two parents.
    async fn crossover(&self, first: &Variant, second: &Variant, seed: u64) -> Result<String>;
}
