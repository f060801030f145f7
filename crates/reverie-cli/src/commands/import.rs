use crate::bootstrap::Services;
use anyhow::{Context, Result};
use reverie_core::session::Session;
use std::path::Path;

/// Persists a session recorded elsewhere (e.g. pulled off a robot) as-is.
pub async fn run(services: &Services, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let session: Session = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a session document", path.display()))?;

    session
        .validate()
        .with_context(|| format!("Refusing to import {}", path.display()))?;

    services.sessions.save(&session).await?;
    tracing::info!(
        session_id = %session.id,
        behavior = %session.behavior_name,
        frames = session.frames.len(),
        failures = session.failures.len(),
        "Session imported"
    );
    println!("Imported session {}", session.id);
    Ok(())
}
