use crate::bootstrap::Services;
use anyhow::Result;
use std::path::PathBuf;

/// Command-line overrides on top of the configured dreaming settings.
pub struct DreamOverrides {
    pub auto_apply: bool,
    pub threshold: Option<f64>,
    pub generations: Option<u32>,
}

pub async fn run(services: &Services, behavior: PathBuf, overrides: DreamOverrides) -> Result<()> {
    let mut options = services.config.schedule_options().cycle_options(behavior);
    options.auto_apply |= overrides.auto_apply;
    if let Some(threshold) = overrides.threshold {
        options.auto_apply_threshold = threshold;
    }
    if let Some(generations) = overrides.generations {
        options.evolution.generations = generations;
    }

    let interrupt = super::interrupt_on_ctrl_c(services.orchestrator.clone());
    let report = services.orchestrator.run_dreaming_cycle(&options).await;
    interrupt.abort();
    let report = report?;
    let result = &report.result;

    println!(
        "{}: base fitness {:.4}, best {:.4} ({}), improvement {:.2}%",
        result.behavior_name,
        result.base_fitness,
        result.best_fitness(),
        result.best_variant.id,
        result.improvement_percent
    );
    println!(
        "{} generation(s) over {} failed session(s){}",
        result.generations_run,
        result.corpus_size,
        if result.cancelled { ", interrupted" } else { "" }
    );
    if report.applied {
        println!("Patch applied to {}", result.behavior_path.display());
    } else if options.auto_apply {
        println!(
            "Not applied: improvement below {:.2}%",
            options.auto_apply_threshold
        );
    }

    Ok(())
}
