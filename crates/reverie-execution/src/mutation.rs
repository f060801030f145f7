//! Structured-diff variation operators over behavior parameters.
//!
//! Both operators only touch numeric `key = value` lines; the rest of the
//! behavior text is inherited from the first parent unchanged.

use crate::params::ParameterDocument;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reverie_core::error::{ReverieError, Result};
use reverie_core::evolution::{MutationStrategy, Variant};

fn parse_tunable(variant: &Variant) -> Result<(ParameterDocument, Vec<String>)> {
    let doc = ParameterDocument::parse(&variant.payload);
    let keys = doc.keys();
    if keys.is_empty() {
        return Err(ReverieError::inference(format!(
            "variant '{}' has no numeric parameters to vary",
            variant.id
        )));
    }
    Ok((doc, keys))
}

/// Seeded random perturbation: each mutation scales one or two parameters by
/// a factor drawn from `[1 - scale, 1 + scale]`.
#[derive(Debug, Clone)]
pub struct ParameterPerturbation {
    scale: f64,
}

impl ParameterPerturbation {
    pub fn new(scale: f64) -> Self {
        Self {
            scale: scale.abs().min(0.95),
        }
    }
}

impl Default for ParameterPerturbation {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[async_trait]
impl MutationStrategy for ParameterPerturbation {
    fn name(&self) -> &str {
        "parameter-perturbation"
    }

    async fn mutate(&self, parent: &Variant, seed: u64) -> Result<String> {
        let (mut doc, mut keys) = parse_tunable(parent)?;
        let mut rng = StdRng::seed_from_u64(seed);

        keys.shuffle(&mut rng);
        let count = rng.gen_range(1..=keys.len().min(2));
        for key in keys.iter().take(count) {
            let Some(current) = doc.get(key) else {
                continue;
            };
            let factor = 1.0 + rng.gen_range(-self.scale..=self.scale);
            // A zero parameter would never move under pure scaling
            let base = if current == 0.0 { 0.1 } else { current };
            doc.set(key, (base * factor).max(0.0));
        }

        Ok(doc.render())
    }

    async fn crossover(&self, first: &Variant, second: &Variant, seed: u64) -> Result<String> {
        let (mut doc, keys) = parse_tunable(first)?;
        let other = ParameterDocument::parse(&second.payload);
        let mut rng = StdRng::seed_from_u64(seed);

        for key in keys {
            if let Some(value) = other.get(&key) {
                if rng.gen_bool(0.5) {
                    doc.set(&key, value);
                }
            }
        }

        Ok(doc.render())
    }
}

/// Deterministic fallback operator, no randomness involved.
///
/// Mutation nudges one parameter by `step` (fraction) up or down, picked from
/// the seed; crossover averages every shared parameter.
#[derive(Debug, Clone)]
pub struct NudgeMutation {
    step: f64,
}

impl NudgeMutation {
    pub fn new(step: f64) -> Self {
        Self { step: step.abs() }
    }
}

impl Default for NudgeMutation {
    fn default() -> Self {
        Self::new(0.05)
    }
}

#[async_trait]
impl MutationStrategy for NudgeMutation {
    fn name(&self) -> &str {
        "nudge"
    }

    async fn mutate(&self, parent: &Variant, seed: u64) -> Result<String> {
        let (mut doc, keys) = parse_tunable(parent)?;
        let slot = (seed % keys.len() as u64) as usize;
        let upward = (seed / keys.len() as u64) % 2 == 0;

        let key = &keys[slot];
        if let Some(current) = doc.get(key) {
            let factor = if upward { 1.0 + self.step } else { 1.0 - self.step };
            doc.set(key, (current * factor).max(0.0));
        }

        Ok(doc.render())
    }

    async fn crossover(&self, first: &Variant, second: &Variant, _seed: u64) -> Result<String> {
        let (mut doc, keys) = parse_tunable(first)?;
        let other = ParameterDocument::parse(&second.payload);

        for key in keys {
            if let (Some(a), Some(b)) = (doc.get(&key), other.get(&key)) {
                doc.set(&key, (a + b) / 2.0);
            }
        }

        Ok(doc.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATROL: &str = "# patrol\nmax_speed = 0.8\nstop_distance_cm = 8\nslow_distance_cm = 20\n";

    fn variant(id: &str, payload: &str) -> Variant {
        Variant::child(id, 1, vec!["base".to_string()], payload)
    }

    #[tokio::test]
    async fn test_perturbation_is_seeded() {
        let op = ParameterPerturbation::default();
        let parent = Variant::base(PATROL);

        let a = op.mutate(&parent, 11).await.unwrap();
        let b = op.mutate(&parent, 11).await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("# patrol\n"));
        assert_eq!(ParameterDocument::parse(&a).keys().len(), 3);
    }

    #[tokio::test]
    async fn test_perturbation_stays_within_scale() {
        let op = ParameterPerturbation::new(0.2);
        let parent = Variant::base(PATROL);
        for seed in 0..20 {
            let child = ParameterDocument::parse(&op.mutate(&parent, seed).await.unwrap());
            let speed = child.get("max_speed").unwrap();
            assert!((0.8 * 0.8 - 1e-3..=0.8 * 1.2 + 1e-3).contains(&speed));
        }
    }

    #[tokio::test]
    async fn test_crossover_takes_values_from_parents() {
        let op = ParameterPerturbation::default();
        let a = variant("a", "max_speed = 1\nstop_distance_cm = 5\n");
        let b = variant("b", "max_speed = 2\nstop_distance_cm = 9\n");
        let child = ParameterDocument::parse(&op.crossover(&a, &b, 3).await.unwrap());
        assert!([1.0, 2.0].contains(&child.get("max_speed").unwrap()));
        assert!([5.0, 9.0].contains(&child.get("stop_distance_cm").unwrap()));
    }

    #[tokio::test]
    async fn test_no_parameters_is_inference_unavailable() {
        let op = ParameterPerturbation::default();
        let err = op
            .mutate(&Variant::base("just prose, nothing to tune"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ReverieError::InferenceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_nudge_is_deterministic_and_small() {
        let op = NudgeMutation::default();
        let parent = Variant::base("max_speed = 1\nstop_distance_cm = 10\n");

        // seed 0 -> slot 0, upward; seed 3 -> slot 1, downward
        let up = ParameterDocument::parse(&op.mutate(&parent, 0).await.unwrap());
        assert!((up.get("max_speed").unwrap() - 1.05).abs() < 1e-9);

        let down = ParameterDocument::parse(&op.mutate(&parent, 3).await.unwrap());
        assert!((down.get("stop_distance_cm").unwrap() - 9.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nudge_crossover_averages() {
        let op = NudgeMutation::default();
        let a = variant("a", "max_speed = 1\n");
        let b = variant("b", "max_speed = 0.5\n");
        let child = ParameterDocument::parse(&op.crossover(&a, &b, 0).await.unwrap());
        assert!((child.get("max_speed").unwrap() - 0.75).abs() < 1e-9);
    }
}
