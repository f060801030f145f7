//! Domain layer of the Reverie dreaming engine.
//!
//! Holds the recorded-session model, search types, orchestrator state, the
//! shared error type and the collaborator traits implemented by the
//! infrastructure and execution crates. Nothing in here performs I/O.

pub mod behavior;
pub mod config;
pub mod dreaming;
pub mod error;
pub mod evolution;
pub mod session;
pub mod simulation;

// Re-export common error type
pub use error::{ReverieError, Result};
