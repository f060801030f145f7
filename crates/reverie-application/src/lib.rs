//! Application layer for Reverie.
//!
//! Wires the storage and simulation collaborators from `reverie-core` into the
//! four dreaming components: session recording, deterministic replay,
//! evolutionary search and the orchestrator that schedules it.

pub mod evolution;
pub mod orchestrator;
pub mod recorder;
pub mod replayer;
pub mod seed;

pub use evolution::EvolutionEngine;
pub use orchestrator::DreamingOrchestrator;
pub use recorder::SessionRecorder;
pub use replayer::Replayer;
