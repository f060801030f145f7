//! Configuration root, as stored in `config.toml`.
//!
//! Every section and field has a default, so a missing or partial file is valid.

use crate::dreaming::{DreamingSettings, ScheduleOptions};
use crate::evolution::EvolutionOptions;
use crate::simulation::ReplayOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ReverieConfig {
    pub storage: StorageSettings,
    pub recorder: RecorderSettings,
    pub replay: ReplayOptions,
    pub evolution: EvolutionOptions,
    pub dreaming: DreamingSettings,
}

impl ReverieConfig {
    /// Scheduling options derived from the `[dreaming]` and `[evolution]` sections.
    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            settings: self.dreaming.clone(),
            evolution: self.evolution.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Overrides the platform data directory for sessions
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RecorderSettings {
    /// Queue a checkpoint write after this many buffered frames
    pub flush_every_frames: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            flush_every_frames: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ReverieConfig = toml::from_str("").unwrap();
        assert_eq!(config, ReverieConfig::default());
        assert_eq!(config.recorder.flush_every_frames, 32);
        assert_eq!(config.dreaming.min_failures, 3);
    }

    #[test]
    fn test_partial_sections() {
        let config: ReverieConfig = toml::from_str(
            r#"
            [dreaming]
            auto_apply = true

            [evolution]
            generations = 12

            [replay]
            progress_weight = 0.5
            "#,
        )
        .unwrap();
        assert!(config.dreaming.auto_apply);
        assert_eq!(config.dreaming.auto_apply_threshold, 10.0);
        assert_eq!(config.evolution.generations, 12);
        assert_eq!(config.replay.progress_weight, 0.5);
        assert_eq!(config.replay.avoidance_weight, 0.7);

        let schedule = config.schedule_options();
        assert!(schedule.settings.auto_apply);
        assert_eq!(schedule.evolution.generations, 12);
    }
}
