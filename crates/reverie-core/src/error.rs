//! Error types for the dreaming engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for every Reverie crate.
///
/// Recorder misuse (`AlreadyRecording`, `UnknownSession`, `InvalidFrameIndex`) is a
/// caller bug and fails fast. `EvolutionBusy` is a concurrency guard, not a fault of
/// the system: callers should retry later.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReverieError {
    /// A session is already being recorded for this device
    #[error("Device '{device_id}' is already recording session '{session_id}'")]
    AlreadyRecording {
        device_id: String,
        session_id: String,
    },

    /// The session is not active (never started or already ended)
    #[error("Unknown or inactive session: '{session_id}'")]
    UnknownSession { session_id: String },

    /// A failure references a frame that does not exist
    #[error("Frame index {frame_index} is out of range (session has {frame_count} frames)")]
    InvalidFrameIndex {
        frame_index: usize,
        frame_count: usize,
    },

    /// A stored or imported session breaks a recording invariant
    #[error("Session '{session_id}' is inconsistent: {reason}")]
    InconsistentSession { session_id: String, reason: String },

    /// Another evolution run is in flight in this process
    #[error("An evolution run is already in progress")]
    EvolutionBusy,

    /// No failed sessions exist for the behavior being evolved
    #[error("No failed sessions recorded for behavior '{behavior}'")]
    EmptyCorpus { behavior: String },

    /// Simulation of a single variant crashed
    #[error("Simulation failure: {0}")]
    SimulationFailure(String),

    /// Writing a behavior patch failed
    #[error("Failed to write patch to '{path}': {message}")]
    PatchWriteFailed { path: String, message: String },

    /// The mutation/crossover operator could not produce a child
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReverieError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        Self::UnknownSession {
            session_id: session_id.into(),
        }
    }

    pub fn simulation(message: impl Into<String>) -> Self {
        Self::SimulationFailure(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::InferenceUnavailable(message.into())
    }

    pub fn patch_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PatchWriteFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is the evolution busy guard
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::EvolutionBusy)
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ReverieError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ReverieError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ReverieError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ReverieError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error, for collaborators that report through anyhow
impl From<anyhow::Error> for ReverieError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<String> for ReverieError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, ReverieError>`.
pub type Result<T> = std::result::Result<T, ReverieError>;
