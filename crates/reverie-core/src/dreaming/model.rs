//! Orchestrator options and reports.

use crate::evolution::{EvolutionOptions, EvolutionResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Policy knobs for dreaming, loaded from the `[dreaming]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DreamingSettings {
    /// Minimum recorded failures before a behavior is worth dreaming about
    pub min_failures: usize,
    pub auto_apply: bool,
    /// Inclusive improvement threshold, in percent
    pub auto_apply_threshold: f64,
    /// How many failed sessions `should_dream` inspects
    pub failure_scan_limit: usize,
}

impl Default for DreamingSettings {
    fn default() -> Self {
        Self {
            min_failures: 3,
            auto_apply: false,
            auto_apply_threshold: 10.0,
            failure_scan_limit: 100,
        }
    }
}

/// Options for a single `run_dreaming_cycle` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamingCycleOptions {
    pub behavior_path: PathBuf,
    pub auto_apply: bool,
    pub auto_apply_threshold: f64,
    #[serde(default)]
    pub evolution: EvolutionOptions,
}

impl DreamingCycleOptions {
    pub fn new(behavior_path: impl Into<PathBuf>) -> Self {
        let settings = DreamingSettings::default();
        Self {
            behavior_path: behavior_path.into(),
            auto_apply: settings.auto_apply,
            auto_apply_threshold: settings.auto_apply_threshold,
            evolution: EvolutionOptions::default(),
        }
    }

    /// Whether `improvement_percent` qualifies for an automatic patch.
    pub fn should_apply(&self, improvement_percent: f64) -> bool {
        self.auto_apply && improvement_percent >= self.auto_apply_threshold
    }
}

/// What one dreaming cycle produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamingCycleReport {
    pub result: EvolutionResult,
    /// Whether the best variant was written back
    pub applied: bool,
}

/// Options shared by every behavior in a `schedule_dreaming` pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOptions {
    pub settings: DreamingSettings,
    #[serde(default)]
    pub evolution: EvolutionOptions,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            settings: DreamingSettings::default(),
            evolution: EvolutionOptions::default(),
        }
    }
}

impl ScheduleOptions {
    pub fn cycle_options(&self, behavior_path: impl Into<PathBuf>) -> DreamingCycleOptions {
        DreamingCycleOptions {
            behavior_path: behavior_path.into(),
            auto_apply: self.settings.auto_apply,
            auto_apply_threshold: self.settings.auto_apply_threshold,
            evolution: self.evolution.clone(),
        }
    }
}

/// Per-behavior outcome of a scheduling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// Another evolution run owned the engine
    SkippedBusy,
    InsufficientFailures { failures: usize, required: usize },
    Completed {
        improvement_percent: f64,
        generations_run: u32,
        applied: bool,
    },
    Failed { error: String },
    /// The pass was interrupted before this behavior was reached
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub behavior_path: PathBuf,
    pub behavior_name: String,
    pub outcome: ScheduleOutcome,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleReport {
    pub fn completed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, ScheduleOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, ScheduleOutcome::Failed { .. }))
            .count()
    }
}

/// Read-side aggregate over every recorded session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DreamingStats {
    pub total_sessions: usize,
    pub failed_sessions: usize,
    pub total_failures: usize,
    /// Failure count per failure type
    pub failure_types: BTreeMap<String, usize>,
    /// Failure count per behavior name
    pub failures_by_behavior: BTreeMap<String, usize>,
}
