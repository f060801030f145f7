//! Deterministic replay of recorded sessions against candidate behaviors.

use crate::seed::session_seed;
use reverie_core::error::{Result, ReverieError};
use reverie_core::evolution::Variant;
use reverie_core::session::Session;
use reverie_core::simulation::{ReplayOptions, ReplayOutcome, SimulationRun, Simulator};
use std::sync::Arc;
use std::time::Duration;

/// Scores variants by re-running recorded sessions in simulation.
///
/// The simulation seed is derived from the session id only, so repeated calls
/// with the same (session, variant) pair return identical outcomes. The
/// replayer holds no mutable state and can be shared across concurrent
/// evaluations.
pub struct Replayer {
    simulator: Arc<dyn Simulator>,
    options: ReplayOptions,
}

impl Replayer {
    pub fn new(simulator: Arc<dyn Simulator>, options: ReplayOptions) -> Self {
        Self { simulator, options }
    }

    /// Replays `session` against `variant` with the configured options.
    pub async fn replay(&self, session: &Session, variant: &Variant) -> ReplayOutcome {
        self.replay_with(session, variant, &self.options).await
    }

    /// Replays with explicit options.
    ///
    /// Never fails: a simulation crash or timeout scores 0 and is recorded in
    /// `ReplayOutcome::crash`.
    pub async fn replay_with(
        &self,
        session: &Session,
        variant: &Variant,
        options: &ReplayOptions,
    ) -> ReplayOutcome {
        let seed = session_seed(&session.id);
        let simulation = self
            .simulator
            .simulate(&session.frames, &variant.payload, seed);

        let result = match options.timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), simulation).await {
                Ok(result) => result,
                Err(_) => Err(ReverieError::simulation(format!(
                    "simulation exceeded {} ms",
                    ms
                ))),
            },
            None => simulation.await,
        };

        match result.and_then(|run| score(session, variant, run, options)) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    variant = %variant.id,
                    "Simulation crashed, scoring 0: {}",
                    e
                );
                ReplayOutcome {
                    session_id: session.id.clone(),
                    variant_id: variant.id.clone(),
                    success: false,
                    fitness: 0.0,
                    reproduced_failures: Vec::new(),
                    trace: Vec::new(),
                    crash: Some(e.to_string()),
                }
            }
        }
    }
}

/// Combines failure avoidance and task progress into a [0, 1] fitness.
///
/// A run whose signals do not yield a finite fitness is treated as a crash.
fn score(
    session: &Session,
    variant: &Variant,
    run: SimulationRun,
    options: &ReplayOptions,
) -> Result<ReplayOutcome> {
    let reproduced_failures: Vec<_> = session
        .failures
        .iter()
        .filter(|failure| run.faulted_at(failure.frame_index))
        .cloned()
        .collect();

    let avoided_fraction = if session.failures.is_empty() {
        if run.steps.is_empty() {
            1.0
        } else {
            1.0 - run.fault_count() as f64 / run.steps.len() as f64
        }
    } else {
        1.0 - reproduced_failures.len() as f64 / session.failures.len() as f64
    };

    let avoidance_weight = options.avoidance_weight.max(0.0);
    let progress_weight = options.progress_weight.max(0.0);
    let total_weight = avoidance_weight + progress_weight;

    let fitness = if total_weight > 0.0 {
        (avoidance_weight * avoided_fraction + progress_weight * run.mean_progress())
            / total_weight
    } else {
        avoided_fraction
    };
    if !fitness.is_finite() {
        return Err(ReverieError::simulation(format!(
            "simulation produced non-finite fitness {}",
            fitness
        )));
    }

    Ok(ReplayOutcome {
        session_id: session.id.clone(),
        variant_id: variant.id.clone(),
        success: reproduced_failures.is_empty(),
        fitness: fitness.clamp(0.0, 1.0),
        reproduced_failures,
        trace: run.steps,
        crash: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use reverie_core::session::{Failure, Frame};
    use reverie_core::simulation::StepSignal;
    use std::sync::Mutex;

    /// Faults at every frame listed in the payload (`fault:1,2`), records seeds.
    /// `nan` reports unusable progress signals.
    #[derive(Default)]
    struct ScriptedSimulator {
        seeds: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Simulator for ScriptedSimulator {
        async fn simulate(&self, frames: &[Frame], payload: &str, seed: u64) -> Result<SimulationRun> {
            self.seeds.lock().unwrap().push(seed);
            if payload == "crash" {
                return Err(ReverieError::simulation("boom"));
            }
            if payload == "hang" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let faults: Vec<usize> = payload
                .strip_prefix("fault:")
                .map(|list| list.split(',').filter_map(|n| n.parse().ok()).collect())
                .unwrap_or_default();
            let steps = (0..frames.len())
                .map(|frame_index| StepSignal {
                    frame_index,
                    action: "drive".to_string(),
                    progress: if payload == "nan" { f64::NAN } else { 1.0 },
                    fault: faults.contains(&frame_index).then(|| "collision".to_string()),
                })
                .collect();
            Ok(SimulationRun { steps })
        }
    }

    fn session_with_failure_at(frame_index: usize) -> Session {
        let now = Utc::now();
        let mut session = Session::new("s-replay", "patrol", "robot-1", now);
        for _ in 0..3 {
            session.frames.push(Frame {
                timestamp: now,
                snapshot: serde_json::json!({}),
            });
        }
        session.failures.push(Failure {
            failure_type: "collision".to_string(),
            description: "bump".to_string(),
            timestamp: now,
            frame_index,
        });
        session.ended_at = Some(now);
        session
    }

    fn replayer(simulator: Arc<ScriptedSimulator>) -> Replayer {
        Replayer::new(simulator, ReplayOptions::default())
    }

    #[tokio::test]
    async fn test_reproduced_failure_lowers_fitness() {
        let replayer = replayer(Arc::new(ScriptedSimulator::default()));
        let session = session_with_failure_at(1);

        let avoided = replayer.replay(&session, &Variant::base("fault:")).await;
        assert!(avoided.success);
        assert!((avoided.fitness - 1.0).abs() < 1e-9);

        let reproduced = replayer.replay(&session, &Variant::base("fault:1")).await;
        assert!(!reproduced.success);
        assert_eq!(reproduced.reproduced_failures.len(), 1);
        // avoidance 0 (weight 0.7), progress 1 (weight 0.3)
        assert!((reproduced.fitness - 0.3).abs() < 1e-9);

        // A fault elsewhere does not reproduce the recorded failure
        let elsewhere = replayer.replay(&session, &Variant::base("fault:2")).await;
        assert!(elsewhere.success);
    }

    #[tokio::test]
    async fn test_replay_is_deterministic_and_seeded_by_session() {
        let simulator = Arc::new(ScriptedSimulator::default());
        let replayer = replayer(simulator.clone());
        let session = session_with_failure_at(1);
        let variant = Variant::base("fault:1");

        let first = replayer.replay(&session, &variant).await;
        let second = replayer.replay(&session, &variant).await;
        assert_eq!(first, second);

        let seeds = simulator.seeds.lock().unwrap().clone();
        assert_eq!(seeds, vec![session_seed("s-replay"), session_seed("s-replay")]);
    }

    #[tokio::test]
    async fn test_crash_scores_zero_without_error() {
        let replayer = replayer(Arc::new(ScriptedSimulator::default()));
        let outcome = replayer
            .replay(&session_with_failure_at(0), &Variant::base("crash"))
            .await;
        assert_eq!(outcome.fitness, 0.0);
        assert!(!outcome.success);
        assert!(outcome.crash.unwrap().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_crash() {
        let replayer = Replayer::new(
            Arc::new(ScriptedSimulator::default()),
            ReplayOptions {
                timeout_ms: Some(50),
                ..ReplayOptions::default()
            },
        );
        let outcome = replayer
            .replay(&session_with_failure_at(0), &Variant::base("hang"))
            .await;
        assert_eq!(outcome.fitness, 0.0);
        assert!(outcome.crash.unwrap().contains("50 ms"));
    }

    #[tokio::test]
    async fn test_session_without_failures_scores_fault_rate() {
        let replayer = replayer(Arc::new(ScriptedSimulator::default()));
        let mut session = session_with_failure_at(0);
        session.failures.clear();

        let outcome = replayer.replay(&session, &Variant::base("fault:0")).await;
        // avoidance 2/3 (weight 0.7), progress 1 (weight 0.3)
        assert!((outcome.fitness - (0.7 * 2.0 / 3.0 + 0.3)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_finite_progress_is_a_crash() {
        let replayer = replayer(Arc::new(ScriptedSimulator::default()));
        let outcome = replayer
            .replay(&session_with_failure_at(1), &Variant::base("nan"))
            .await;
        assert_eq!(outcome.fitness, 0.0);
        assert!(!outcome.success);
        assert!(outcome.reproduced_failures.is_empty());
        assert!(outcome.crash.unwrap().contains("non-finite"));
    }
}
