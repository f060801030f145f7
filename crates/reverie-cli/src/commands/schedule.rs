use crate::bootstrap::Services;
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(services: &Services, behaviors: &[PathBuf]) -> Result<()> {
    let options = services.config.schedule_options();
    let interrupt = super::interrupt_on_ctrl_c(services.orchestrator.clone());

    let report = services
        .orchestrator
        .schedule_dreaming(behaviors, &options)
        .await;
    interrupt.abort();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
