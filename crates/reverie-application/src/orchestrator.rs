//! Dreaming orchestrator: decides when to search and whether to apply results.

use crate::evolution::EvolutionEngine;
use crate::recorder::SessionRecorder;
use reverie_core::behavior::behavior_name_from_path;
use reverie_core::dreaming::{
    DreamEvent, DreamingCycleOptions, DreamingCycleReport, DreamingSettings, DreamingState,
    DreamingStats, ScheduleEntry, ScheduleOptions, ScheduleOutcome, ScheduleReport,
};
use reverie_core::error::{ReverieError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

type StateMap = Mutex<HashMap<String, DreamingState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State maps stay consistent across a panicking holder
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks one behavior's state and returns it to `Idle` on drop.
struct StateGuard<'a> {
    states: &'a StateMap,
    behavior: String,
    current: DreamingState,
}

impl<'a> StateGuard<'a> {
    /// Claims `behavior` from `Idle` into `Evaluating`. Fails with `EvolutionBusy`
    /// if a cycle already owns it.
    fn enter(states: &'a StateMap, behavior: &str) -> Result<Self> {
        let mut map = lock(states);
        let current = map.get(behavior).copied().unwrap_or_default();
        if current != DreamingState::Idle {
            return Err(ReverieError::EvolutionBusy);
        }
        map.insert(behavior.to_string(), DreamingState::Evaluating);
        Ok(Self {
            states,
            behavior: behavior.to_string(),
            current: DreamingState::Evaluating,
        })
    }

    fn advance(&mut self, next: DreamingState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(ReverieError::internal(format!(
                "illegal dreaming transition for '{}': {} -> {}",
                self.behavior, self.current, next
            )));
        }
        lock(self.states).insert(self.behavior.clone(), next);
        tracing::debug!(behavior = %self.behavior, from = %self.current, to = %next, "Dreaming state changed");
        self.current = next;
        Ok(())
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        lock(self.states).remove(&self.behavior);
    }
}

/// Runs dreaming cycles and idle-time schedules on top of the evolution engine.
pub struct DreamingOrchestrator {
    recorder: Arc<SessionRecorder>,
    engine: Arc<EvolutionEngine>,
    events: broadcast::Sender<DreamEvent>,
    states: StateMap,
    failure_scan_limit: usize,
    /// Cancelled and replaced by `interrupt`
    interrupt: Mutex<CancellationToken>,
}

impl DreamingOrchestrator {
    pub fn new(
        recorder: Arc<SessionRecorder>,
        engine: Arc<EvolutionEngine>,
        settings: &DreamingSettings,
    ) -> Self {
        let events = engine.event_sender();
        Self {
            recorder,
            engine,
            events,
            states: Mutex::new(HashMap::new()),
            failure_scan_limit: settings.failure_scan_limit,
            interrupt: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DreamEvent> {
        self.events.subscribe()
    }

    pub fn state_of(&self, behavior_name: &str) -> DreamingState {
        lock(&self.states)
            .get(behavior_name)
            .copied()
            .unwrap_or_default()
    }

    /// Cancels every in-flight cycle and scheduling pass.
    ///
    /// Running searches stop at their next generation boundary and still
    /// report partial results. Calls made afterwards are unaffected.
    pub fn interrupt(&self) {
        let mut token = lock(&self.interrupt);
        token.cancel();
        *token = CancellationToken::new();
        tracing::info!("Dreaming interrupted");
    }

    /// True iff the behavior's finalized failed sessions hold at least
    /// `min_failures` failures in total.
    pub async fn should_dream(&self, behavior_name: &str, min_failures: usize) -> Result<bool> {
        Ok(self.count_failures(behavior_name).await? >= min_failures)
    }

    /// Runs one search for `options.behavior_path` and applies the best
    /// variant when auto-apply is on and the improvement meets the threshold.
    ///
    /// # Errors
    ///
    /// Search and patch errors are logged, published as `CycleFailed`, and returned.
    pub async fn run_dreaming_cycle(
        &self,
        options: &DreamingCycleOptions,
    ) -> Result<DreamingCycleReport> {
        let behavior_name = behavior_name_from_path(&options.behavior_path);
        let mut guard = StateGuard::enter(&self.states, &behavior_name)
            .and_then(|mut guard| guard.advance(DreamingState::Evolving).map(|()| guard))
            .map_err(|e| self.cycle_failed(&behavior_name, e))?;
        let cancel = self.cancel_scope();
        self.run_cycle(&mut guard, options, &cancel).await
    }

    /// Dreams about each behavior in turn, skipping those without enough
    /// failure evidence. One behavior failing never stops the pass.
    pub async fn schedule_dreaming(
        &self,
        behavior_paths: &[PathBuf],
        options: &ScheduleOptions,
    ) -> ScheduleReport {
        let cancel = self.cancel_scope();
        let mut report = ScheduleReport::default();

        for behavior_path in behavior_paths {
            let behavior_name = behavior_name_from_path(behavior_path);
            let outcome = if cancel.is_cancelled() {
                ScheduleOutcome::Interrupted
            } else {
                self.schedule_one(behavior_path, &behavior_name, options, &cancel)
                    .await
            };
            tracing::info!(behavior = %behavior_name, outcome = ?outcome, "Scheduled behavior processed");
            report.entries.push(ScheduleEntry {
                behavior_path: behavior_path.clone(),
                behavior_name,
                outcome,
            });
        }

        tracing::info!(
            behaviors = report.entries.len(),
            completed = report.completed(),
            failed = report.failed(),
            "Dreaming schedule finished"
        );
        report
    }

    /// Aggregates counts over every recorded session.
    pub async fn get_dreaming_stats(&self) -> Result<DreamingStats> {
        let sessions = self.recorder.list_sessions().await?;
        let mut stats = DreamingStats {
            total_sessions: sessions.len(),
            ..DreamingStats::default()
        };

        for session in &sessions {
            if !session.has_failures() {
                continue;
            }
            stats.failed_sessions += 1;
            stats.total_failures += session.failures.len();
            *stats
                .failures_by_behavior
                .entry(session.behavior_name.clone())
                .or_insert(0) += session.failures.len();
            for failure in &session.failures {
                *stats
                    .failure_types
                    .entry(failure.failure_type.clone())
                    .or_insert(0) += 1;
            }
        }

        Ok(stats)
    }

    async fn schedule_one(
        &self,
        behavior_path: &Path,
        behavior_name: &str,
        options: &ScheduleOptions,
        cancel: &CancellationToken,
    ) -> ScheduleOutcome {
        if self.engine.is_evolution_in_progress() {
            self.skipped(behavior_name, "evolution in progress");
            return ScheduleOutcome::SkippedBusy;
        }

        let mut guard = match StateGuard::enter(&self.states, behavior_name) {
            Ok(guard) => guard,
            Err(_) => {
                self.skipped(behavior_name, "cycle already running");
                return ScheduleOutcome::SkippedBusy;
            }
        };

        let failures = match self.count_failures(behavior_name).await {
            Ok(failures) => failures,
            Err(e) => {
                tracing::error!(behavior = behavior_name, "Failed to count failures: {}", e);
                return ScheduleOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        let required = options.settings.min_failures;
        if failures < required {
            self.skipped(
                behavior_name,
                &format!("{} failures recorded, {} required", failures, required),
            );
            return ScheduleOutcome::InsufficientFailures { failures, required };
        }

        if let Err(e) = guard.advance(DreamingState::Evolving) {
            return ScheduleOutcome::Failed {
                error: e.to_string(),
            };
        }

        let cycle = options.cycle_options(behavior_path);
        match self.run_cycle(&mut guard, &cycle, cancel).await {
            Ok(report) => ScheduleOutcome::Completed {
                improvement_percent: report.result.improvement_percent,
                generations_run: report.result.generations_run,
                applied: report.applied,
            },
            Err(e) if e.is_busy() => ScheduleOutcome::SkippedBusy,
            Err(e) => ScheduleOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Search plus conditional apply. `guard` must be in `Evolving`.
    async fn run_cycle(
        &self,
        guard: &mut StateGuard<'_>,
        options: &DreamingCycleOptions,
        cancel: &CancellationToken,
    ) -> Result<DreamingCycleReport> {
        let behavior_name = guard.behavior.clone();
        tracing::info!(behavior = %behavior_name, path = %options.behavior_path.display(), "Dreaming cycle started");
        self.publish(DreamEvent::CycleStarted {
            behavior: behavior_name.clone(),
        });

        let result = match self
            .engine
            .evolve_skill(&options.behavior_path, &options.evolution, cancel)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.cycle_failed(&behavior_name, e)),
        };

        let mut applied = false;
        if options.should_apply(result.improvement_percent) {
            guard
                .advance(DreamingState::Applying)
                .map_err(|e| self.cycle_failed(&behavior_name, e))?;
            if let Err(e) = self
                .engine
                .apply_patch(&options.behavior_path, &result.best_variant)
                .await
            {
                tracing::warn!(
                    behavior = %behavior_name,
                    variant = %result.best_variant.id,
                    improvement_percent = result.improvement_percent,
                    "Search finished but its best variant could not be written"
                );
                return Err(self.cycle_failed(&behavior_name, e));
            }
            applied = true;
            self.publish(DreamEvent::PatchApplied {
                behavior: behavior_name.clone(),
                variant_id: result.best_variant.id.clone(),
                improvement_percent: result.improvement_percent,
            });
        } else if options.auto_apply {
            tracing::info!(
                behavior = %behavior_name,
                improvement_percent = result.improvement_percent,
                threshold = options.auto_apply_threshold,
                "Improvement below auto-apply threshold"
            );
        }

        tracing::info!(
            behavior = %behavior_name,
            improvement_percent = result.improvement_percent,
            generations_run = result.generations_run,
            applied,
            "Dreaming cycle completed"
        );
        self.publish(DreamEvent::CycleCompleted {
            behavior: behavior_name,
            improvement_percent: result.improvement_percent,
            generations_run: result.generations_run,
            applied,
        });

        Ok(DreamingCycleReport { result, applied })
    }

    async fn count_failures(&self, behavior_name: &str) -> Result<usize> {
        let sessions = self
            .recorder
            .get_failed_sessions_for(behavior_name, self.failure_scan_limit)
            .await?;
        Ok(sessions.iter().map(|session| session.failures.len()).sum())
    }

    fn cancel_scope(&self) -> CancellationToken {
        lock(&self.interrupt).clone()
    }

    /// Logs and publishes `error`, handing it back to the caller.
    fn cycle_failed(&self, behavior_name: &str, error: ReverieError) -> ReverieError {
        if error.is_busy() {
            self.skipped(behavior_name, "evolution in progress");
        } else {
            tracing::error!(behavior = behavior_name, "Dreaming cycle failed: {}", error);
            self.publish(DreamEvent::CycleFailed {
                behavior: behavior_name.to_string(),
                error: error.to_string(),
            });
        }
        error
    }

    fn skipped(&self, behavior_name: &str, reason: &str) {
        tracing::info!(behavior = behavior_name, reason, "Dreaming skipped");
        self.publish(DreamEvent::CycleSkipped {
            behavior: behavior_name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn publish(&self, event: DreamEvent) {
        let _ = self.events.send(event);
    }
}
