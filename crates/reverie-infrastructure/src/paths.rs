//! Unified path management for Reverie configuration and recorded data.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/reverie/           # Config directory
//! └── config.toml              # Engine configuration
//!
//! ~/.local/share/reverie/      # Data directory
//! └── sessions/                # Recorded sessions (one JSON file each)
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "reverie";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Platform path resolution (XDG on Linux, the platform equivalents elsewhere).
pub struct ReveriePaths;

impl ReveriePaths {
    /// Returns the Reverie configuration directory (e.g. `~/.config/reverie/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the Reverie data directory (e.g. `~/.local/share/reverie/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        if let Ok(config_file) = ReveriePaths::config_file() {
            assert!(config_file.ends_with("reverie/config.toml"));
        }
        if let Ok(data_dir) = ReveriePaths::data_dir() {
            assert!(data_dir.ends_with(APP_DIR));
        }
    }
}
