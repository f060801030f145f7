pub mod dream;
pub mod import;
pub mod schedule;
pub mod sessions;
pub mod stats;

use reverie_application::DreamingOrchestrator;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Turns Ctrl-C into a cooperative interrupt. Abort the handle once the work is done.
fn interrupt_on_ctrl_c(orchestrator: Arc<DreamingOrchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt requested, stopping at the next generation boundary");
            orchestrator.interrupt();
        }
    })
}
