//! Built-in deterministic collaborators for the dreaming engine.
//!
//! - [`SafetyEnvelopeSimulator`]: the simulation world used by the replayer
//! - [`ParameterPerturbation`] / [`NudgeMutation`]: primary and fallback
//!   variation operators used by the evolutionary search

pub mod mutation;
pub mod params;
pub mod simulator;

pub use mutation::{NudgeMutation, ParameterPerturbation};
pub use params::ParameterDocument;
pub use simulator::{SafetyEnvelopeSimulator, SimulatorSettings};
