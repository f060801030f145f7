use crate::bootstrap::Services;
use anyhow::Result;

pub async fn show(services: &Services) -> Result<()> {
    let stats = services.orchestrator.get_dreaming_stats().await?;

    println!("Sessions:        {}", stats.total_sessions);
    println!("Failed sessions: {}", stats.failed_sessions);
    println!("Failures:        {}", stats.total_failures);

    if !stats.failure_types.is_empty() {
        println!("\nBy failure type:");
        for (failure_type, count) in &stats.failure_types {
            println!("  {:<20} {}", failure_type, count);
        }
    }
    if !stats.failures_by_behavior.is_empty() {
        println!("\nBy behavior:");
        for (behavior, count) in &stats.failures_by_behavior {
            println!("  {:<20} {}", behavior, count);
        }
    }

    Ok(())
}
