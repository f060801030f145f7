//! Evolutionary search over behavior variants.

use crate::recorder::SessionRecorder;
use crate::replayer::Replayer;
use crate::seed::child_seed;
use futures::stream::{self, StreamExt};
use reverie_core::behavior::{BehaviorRepository, behavior_name_from_path};
use reverie_core::dreaming::DreamEvent;
use reverie_core::error::{ReverieError, Result};
use reverie_core::evolution::{
    EvolutionOptions, EvolutionResult, FitnessAggregation, GenerationStats, MutationStrategy,
    Variant, improvement_percent,
};
use reverie_core::session::Session;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Exclusive right to run a search; releases the engine on drop.
struct EvolutionPermit<'a> {
    busy: &'a AtomicBool,
}

impl<'a> EvolutionPermit<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReverieError::EvolutionBusy)?;
        Ok(Self { busy })
    }
}

impl Drop for EvolutionPermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Generational search that improves a behavior against its failure corpus.
///
/// At most one search runs per engine; a concurrent `evolve_skill` call fails
/// with [`ReverieError::EvolutionBusy`] instead of queuing.
pub struct EvolutionEngine {
    recorder: Arc<SessionRecorder>,
    replayer: Arc<Replayer>,
    behaviors: Arc<dyn BehaviorRepository>,
    operator: Arc<dyn MutationStrategy>,
    fallback: Arc<dyn MutationStrategy>,
    busy: AtomicBool,
    events: broadcast::Sender<DreamEvent>,
}

impl EvolutionEngine {
    pub fn new(
        recorder: Arc<SessionRecorder>,
        replayer: Arc<Replayer>,
        behaviors: Arc<dyn BehaviorRepository>,
        operator: Arc<dyn MutationStrategy>,
        fallback: Arc<dyn MutationStrategy>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            recorder,
            replayer,
            behaviors,
            operator,
            fallback,
            busy: AtomicBool::new(false),
            events,
        }
    }

    /// True exactly while an `evolve_skill` call holds the engine.
    pub fn is_evolution_in_progress(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DreamEvent> {
        self.events.subscribe()
    }

    /// Sender half of the event bus, shared with the orchestrator.
    pub fn event_sender(&self) -> broadcast::Sender<DreamEvent> {
        self.events.clone()
    }

    /// Runs the search for the behavior stored at `behavior_path`.
    ///
    /// `cancel` is checked between generations; a cancelled run still returns
    /// the best variant found so far with `cancelled` set.
    ///
    /// # Errors
    ///
    /// - `EvolutionBusy` if another search holds the engine
    /// - `EmptyCorpus` if the behavior has no failed sessions
    /// - storage errors reading the behavior or the corpus
    pub async fn evolve_skill(
        &self,
        behavior_path: &Path,
        options: &EvolutionOptions,
        cancel: &CancellationToken,
    ) -> Result<EvolutionResult> {
        let _permit = EvolutionPermit::acquire(&self.busy)?;
        let behavior_name = behavior_name_from_path(behavior_path);

        let payload = self.behaviors.read(behavior_path).await?;
        let corpus = self
            .recorder
            .get_failed_sessions_for(&behavior_name, options.corpus_limit)
            .await?;
        if corpus.is_empty() {
            return Err(ReverieError::EmptyCorpus {
                behavior: behavior_name,
            });
        }

        let base = self
            .score_variant(Variant::base(payload), &corpus, options.aggregation)
            .await?;
        let base_fitness = base.fitness_or_zero();
        tracing::info!(
            behavior = %behavior_name,
            corpus_size = corpus.len(),
            base_fitness,
            "Base behavior evaluated"
        );
        self.publish(DreamEvent::BaseEvaluated {
            behavior: behavior_name.clone(),
            base_fitness,
            corpus_size: corpus.len(),
        });

        let mut elites = vec![base.clone()];
        let mut best = base.clone();
        let mut history = Vec::new();
        let mut generations_run = 0;
        let mut stalled = 0;
        let mut cancelled = false;

        for generation in 1..=options.generations {
            if cancel.is_cancelled() {
                tracing::info!(behavior = %behavior_name, generation, "Search cancelled");
                cancelled = true;
                break;
            }

            let (children, operator_failures) =
                self.breed(&behavior_name, generation, &elites, options).await;

            let evaluated: Vec<Variant> = stream::iter(children)
                .map(|child| self.score_variant(child, &corpus, options.aggregation))
                .buffered(options.max_concurrency.max(1))
                .collect::<Vec<Result<Variant>>>()
                .await
                .into_iter()
                .collect::<Result<_>>()?;

            generations_run = generation;

            let generation_best = evaluated
                .iter()
                .max_by(|a, b| a.fitness_or_zero().total_cmp(&b.fitness_or_zero()));
            let improved = match generation_best {
                Some(candidate) if candidate.fitness_or_zero() > best.fitness_or_zero() => {
                    best = candidate.clone();
                    true
                }
                _ => false,
            };

            let mean_fitness = if evaluated.is_empty() {
                0.0
            } else {
                evaluated.iter().map(Variant::fitness_or_zero).sum::<f64>() / evaluated.len() as f64
            };

            let stats = GenerationStats {
                generation,
                children_evaluated: evaluated.len(),
                best_fitness: best.fitness_or_zero(),
                mean_fitness,
                operator_failures,
                improved,
            };
            tracing::debug!(
                behavior = %behavior_name,
                generation,
                children = stats.children_evaluated,
                best_fitness = stats.best_fitness,
                mean_fitness,
                "Generation completed"
            );
            self.publish(DreamEvent::GenerationCompleted {
                behavior: behavior_name.clone(),
                generation,
                best_fitness: stats.best_fitness,
                mean_fitness,
            });
            history.push(stats);

            elites = select_elites(elites, evaluated, options.elite_count, &base);

            stalled = if improved { 0 } else { stalled + 1 };
            if options.plateau_generations > 0 && stalled >= options.plateau_generations {
                tracing::info!(
                    behavior = %behavior_name,
                    generation,
                    "No improvement for {} generations, stopping",
                    stalled
                );
                break;
            }
        }

        let improvement = improvement_percent(base_fitness, best.fitness_or_zero());
        tracing::info!(
            behavior = %behavior_name,
            best_variant = %best.id,
            best_fitness = best.fitness_or_zero(),
            improvement_percent = improvement,
            generations_run,
            "Search finished"
        );

        Ok(EvolutionResult {
            behavior_name,
            behavior_path: behavior_path.to_path_buf(),
            best_variant: best,
            base_fitness,
            improvement_percent: improvement,
            generations_run,
            history,
            corpus_size: corpus.len(),
            cancelled,
        })
    }

    /// Writes `variant`'s payload over the behavior at `behavior_path`.
    ///
    /// Leaves search results untouched whether or not the write succeeds.
    pub async fn apply_patch(&self, behavior_path: &Path, variant: &Variant) -> Result<()> {
        self.behaviors
            .write_atomic(behavior_path, &variant.payload)
            .await
            .map_err(|e| match e {
                ReverieError::PatchWriteFailed { .. } => e,
                other => ReverieError::patch_write(
                    behavior_path.display().to_string(),
                    other.to_string(),
                ),
            })?;

        tracing::info!(
            path = %behavior_path.display(),
            variant = %variant.id,
            "Patch applied"
        );
        Ok(())
    }

    /// Produces up to `population_size` children from the current elites.
    ///
    /// Returns the children and the number of failed operator calls.
    async fn breed(
        &self,
        behavior_name: &str,
        generation: u32,
        elites: &[Variant],
        options: &EvolutionOptions,
    ) -> (Vec<Variant>, usize) {
        let mut children = Vec::with_capacity(options.population_size);
        let mut failures = 0;

        if elites.is_empty() {
            return (children, failures);
        }

        for slot in 0..options.population_size {
            if failures > options.max_operator_failures {
                tracing::warn!(
                    behavior = behavior_name,
                    generation,
                    failures,
                    "Too many operator failures, continuing with {} children",
                    children.len()
                );
                break;
            }

            let seed = child_seed(behavior_name, generation, slot);
            let first = &elites[slot % elites.len()];
            let second = (slot % 2 == 1 && elites.len() >= 2)
                .then(|| &elites[(slot + 1) % elites.len()]);

            let mut produced = None;
            for operator in [&self.operator, &self.fallback] {
                let attempt = match second {
                    Some(second) => operator.crossover(first, second, seed).await,
                    None => operator.mutate(first, seed).await,
                };
                match attempt {
                    Ok(payload) => {
                        produced = Some(payload);
                        break;
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(
                            behavior = behavior_name,
                            generation,
                            slot,
                            operator = operator.name(),
                            "Variation operator failed: {}",
                            e
                        );
                    }
                }
            }

            if let Some(payload) = produced {
                let mut parent_ids = vec![first.id.clone()];
                if let Some(second) = second {
                    parent_ids.push(second.id.clone());
                }
                children.push(Variant::child(
                    format!("g{}-c{}", generation, slot),
                    generation,
                    parent_ids,
                    payload,
                ));
            }
        }

        (children, failures)
    }

    /// Replays every corpus session against `variant` and records the aggregate.
    async fn score_variant(
        &self,
        mut variant: Variant,
        corpus: &[Session],
        aggregation: FitnessAggregation,
    ) -> Result<Variant> {
        let mut scores = Vec::with_capacity(corpus.len());
        for session in corpus {
            scores.push(self.replayer.replay(session, &variant).await.fitness);
        }
        variant.assign_fitness(aggregation.aggregate(&scores))?;
        Ok(variant)
    }

    fn publish(&self, event: DreamEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Keeps the `elite_count` fittest of elites and children, plus the base.
fn select_elites(
    elites: Vec<Variant>,
    children: Vec<Variant>,
    elite_count: usize,
    base: &Variant,
) -> Vec<Variant> {
    let mut pool: Vec<Variant> = elites.into_iter().chain(children).collect();
    // Stable: on ties, earlier (older) variants win
    pool.sort_by(|a, b| b.fitness_or_zero().total_cmp(&a.fitness_or_zero()));
    pool.truncate(elite_count.max(1));
    if !pool.iter().any(Variant::is_base) {
        pool.push(base.clone());
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use reverie_core::config::RecorderSettings;
    use reverie_core::session::{Failure, Frame, SessionRepository};
    use reverie_core::simulation::{ReplayOptions, SimulationRun, Simulator, StepSignal};
    use reverie_infrastructure::InMemorySessionRepository;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Progress equals the payload's `quality`; never faults.
    struct QualitySimulator;

    #[async_trait]
    impl Simulator for QualitySimulator {
        async fn simulate(&self, frames: &[Frame], payload: &str, _seed: u64) -> Result<SimulationRun> {
            let quality = quality_of(payload)
                .ok_or_else(|| ReverieError::simulation("no quality"))?;
            Ok(SimulationRun {
                steps: (0..frames.len())
                    .map(|frame_index| StepSignal {
                        frame_index,
                        action: "drive".to_string(),
                        progress: quality,
                        fault: None,
                    })
                    .collect(),
            })
        }
    }

    fn quality_of(payload: &str) -> Option<f64> {
        payload.strip_prefix("quality = ")?.trim().parse().ok()
    }

    /// Adds `step` to the quality, capped at 1.
    struct StepUp {
        step: f64,
    }

    #[async_trait]
    impl MutationStrategy for StepUp {
        fn name(&self) -> &str {
            "step-up"
        }

        async fn mutate(&self, parent: &Variant, _seed: u64) -> Result<String> {
            let quality = quality_of(&parent.payload).unwrap_or(0.0);
            Ok(format!("quality = {}", (quality + self.step).min(1.0)))
        }

        async fn crossover(&self, first: &Variant, _second: &Variant, seed: u64) -> Result<String> {
            self.mutate(first, seed).await
        }
    }

    /// Always fails, counting calls.
    #[derive(Default)]
    struct Broken {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl MutationStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn mutate(&self, _parent: &Variant, _seed: u64) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            Err(ReverieError::inference("offline"))
        }

        async fn crossover(&self, first: &Variant, _second: &Variant, seed: u64) -> Result<String> {
            self.mutate(first, seed).await
        }
    }

    #[derive(Default)]
    struct MemoryBehaviors {
        files: Mutex<HashMap<PathBuf, String>>,
    }

    #[async_trait]
    impl BehaviorRepository for MemoryBehaviors {
        async fn read(&self, path: &Path) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| ReverieError::not_found("behavior", path.display().to_string()))
        }

        async fn write_atomic(&self, path: &Path, payload: &str) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), payload.to_string());
            Ok(())
        }
    }

    fn failed_session(id: &str, behavior: &str) -> Session {
        let now = Utc::now();
        let mut session = Session::new(id, behavior, "robot-1", now);
        session.frames.push(Frame {
            timestamp: now,
            snapshot: serde_json::json!({}),
        });
        session.failures.push(Failure {
            failure_type: "collision".to_string(),
            description: "bump".to_string(),
            timestamp: now,
            frame_index: 0,
        });
        session.ended_at = Some(now);
        session
    }

    async fn engine_with(
        operator: Arc<dyn MutationStrategy>,
        fallback: Arc<dyn MutationStrategy>,
        sessions: Vec<Session>,
    ) -> (EvolutionEngine, Arc<MemoryBehaviors>) {
        let repository = Arc::new(InMemorySessionRepository::new());
        for session in &sessions {
            repository.save(session).await.unwrap();
        }
        let recorder = Arc::new(SessionRecorder::new(repository, &RecorderSettings::default()));
        let replayer = Arc::new(Replayer::new(Arc::new(QualitySimulator), ReplayOptions::default()));
        let behaviors = Arc::new(MemoryBehaviors::default());
        behaviors
            .write_atomic(Path::new("behaviors/patrol.skill"), "quality = 0.2")
            .await
            .unwrap();
        let engine = EvolutionEngine::new(recorder, replayer, behaviors.clone(), operator, fallback);
        (engine, behaviors)
    }

    #[tokio::test]
    async fn test_search_improves_and_keeps_history() {
        let (engine, _) = engine_with(
            Arc::new(StepUp { step: 0.1 }),
            Arc::new(StepUp { step: 0.0 }),
            vec![failed_session("s1", "patrol")],
        )
        .await;
        let mut events = engine.subscribe();

        let result = engine
            .evolve_skill(
                Path::new("behaviors/patrol.skill"),
                &EvolutionOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.generations_run, 5);
        assert_eq!(result.history.len(), 5);
        assert!(result.improved());
        assert!(result.best_fitness() > result.base_fitness);
        assert!(result.improvement_percent > 0.0);
        assert!(!engine.is_evolution_in_progress());

        assert!(matches!(
            events.recv().await.unwrap(),
            DreamEvent::BaseEvaluated { corpus_size: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_no_improvement_plateaus_and_keeps_base() {
        let (engine, _) = engine_with(
            Arc::new(StepUp { step: 0.0 }),
            Arc::new(StepUp { step: 0.0 }),
            vec![failed_session("s1", "patrol")],
        )
        .await;

        let options = EvolutionOptions {
            generations: 10,
            plateau_generations: 2,
            ..EvolutionOptions::default()
        };
        let result = engine
            .evolve_skill(Path::new("behaviors/patrol.skill"), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.generations_run, 2);
        assert!(result.best_variant.is_base());
        assert_eq!(result.improvement_percent, 0.0);
    }

    #[tokio::test]
    async fn test_fallback_operator_takes_over() {
        let broken = Arc::new(Broken::default());
        let (engine, _) = engine_with(
            broken.clone(),
            Arc::new(StepUp { step: 0.1 }),
            vec![failed_session("s1", "patrol")],
        )
        .await;

        let options = EvolutionOptions {
            generations: 1,
            max_operator_failures: 10,
            ..EvolutionOptions::default()
        };
        let result = engine
            .evolve_skill(Path::new("behaviors/patrol.skill"), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*broken.calls.lock().unwrap(), 4);
        assert_eq!(result.history[0].children_evaluated, 4);
        assert_eq!(result.history[0].operator_failures, 4);
        assert!(result.improved());
    }

    #[tokio::test]
    async fn test_repeated_operator_failures_end_the_generation() {
        let (engine, _) = engine_with(
            Arc::new(Broken::default()),
            Arc::new(Broken::default()),
            vec![failed_session("s1", "patrol")],
        )
        .await;

        let options = EvolutionOptions {
            generations: 1,
            max_operator_failures: 3,
            ..EvolutionOptions::default()
        };
        let result = engine
            .evolve_skill(Path::new("behaviors/patrol.skill"), &options, &CancellationToken::new())
            .await
            .unwrap();

        // Two slots fail on both operators, then the generation stops breeding
        assert_eq!(result.history[0].children_evaluated, 0);
        assert_eq!(result.history[0].operator_failures, 4);
        assert!(result.best_variant.is_base());
    }

    #[tokio::test]
    async fn test_empty_corpus_is_an_error() {
        let (engine, _) = engine_with(
            Arc::new(StepUp { step: 0.1 }),
            Arc::new(StepUp { step: 0.1 }),
            vec![failed_session("s1", "dock")],
        )
        .await;

        let err = engine
            .evolve_skill(
                Path::new("behaviors/patrol.skill"),
                &EvolutionOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReverieError::EmptyCorpus { ref behavior } if behavior == "patrol"));
        assert!(!engine.is_evolution_in_progress());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_generation() {
        let (engine, _) = engine_with(
            Arc::new(StepUp { step: 0.1 }),
            Arc::new(StepUp { step: 0.1 }),
            vec![failed_session("s1", "patrol")],
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .evolve_skill(Path::new("behaviors/patrol.skill"), &EvolutionOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.generations_run, 0);
        assert!(result.best_variant.is_base());
    }

    #[tokio::test]
    async fn test_apply_patch_writes_payload() {
        let (engine, behaviors) = engine_with(
            Arc::new(StepUp { step: 0.1 }),
            Arc::new(StepUp { step: 0.1 }),
            Vec::new(),
        )
        .await;
        let path = Path::new("behaviors/patrol.skill");
        let variant = Variant::child("g1-c0", 1, vec!["base".to_string()], "quality = 0.9");

        engine.apply_patch(path, &variant).await.unwrap();
        assert_eq!(behaviors.read(path).await.unwrap(), "quality = 0.9");
    }

    #[test]
    fn test_select_elites_keeps_base() {
        let mut base = Variant::base("quality = 0.1");
        base.assign_fitness(0.1).unwrap();
        let children = [0.5, 0.4, 0.3]
            .iter()
            .enumerate()
            .map(|(slot, fitness)| {
                let mut child = Variant::child(format!("g1-c{}", slot), 1, vec![], "x");
                child.assign_fitness(*fitness).unwrap();
                child
            })
            .collect();

        let elites = select_elites(vec![base.clone()], children, 2, &base);
        let ids: Vec<_> = elites.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["g1-c0", "g1-c1", "base"]);
    }

    #[test]
    fn test_permit_is_exclusive_and_released_on_drop() {
        let busy = AtomicBool::new(false);
        {
            let _permit = EvolutionPermit::acquire(&busy).unwrap();
            assert!(busy.load(Ordering::Acquire));
            assert!(matches!(
                EvolutionPermit::acquire(&busy),
                Err(ReverieError::EvolutionBusy)
            ));
        }
        assert!(!busy.load(Ordering::Acquire));
    }
}
