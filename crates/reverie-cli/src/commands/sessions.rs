use crate::bootstrap::Services;
use anyhow::Result;
use reverie_core::session::Session;

pub async fn list(services: &Services, limit: Option<usize>) -> Result<()> {
    let mut sessions = services.recorder.list_sessions().await?;
    if let Some(limit) = limit {
        sessions.truncate(limit);
    }
    print_sessions(&sessions);
    Ok(())
}

pub async fn failed(services: &Services, limit: usize) -> Result<()> {
    let sessions = services.recorder.get_failed_sessions(limit).await?;
    print_sessions(&sessions);
    Ok(())
}

fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("No sessions recorded.");
        return;
    }

    for session in sessions {
        let status = if session.is_finalized() { "ended" } else { "open" };
        println!(
            "{}  {:<16} {:<12} {:>5} frames  {:>3} failures  {}  {}",
            session.id,
            session.behavior_name,
            session.device_id,
            session.frames.len(),
            session.failures.len(),
            session.started_at.format("%Y-%m-%d %H:%M:%S"),
            status
        );
    }
}
