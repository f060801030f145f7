//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` and caches it.

use crate::paths::ReveriePaths;
use crate::storage::{AtomicDocument, DocumentFormat};
use reverie_core::config::ReverieConfig;
use reverie_core::error::{ReverieError, Result};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the root configuration.
///
/// A missing file yields `ReverieConfig::default()`; a malformed file is an error
/// so a typo never silently reverts the engine to defaults.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration. Uses RwLock for thread-safe lazy loading.
    config: Arc<RwLock<Option<ReverieConfig>>>,
}

impl ConfigService {
    /// Creates a service reading from an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a service reading from the platform config location.
    pub fn default_location() -> Result<Self> {
        let path = ReveriePaths::config_file()
            .map_err(|e| ReverieError::config(format!("Failed to get config path: {}", e)))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Gets the root configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<ReverieConfig> {
        {
            let read_lock = self
                .config
                .read()
                .map_err(|e| ReverieError::internal(format!("Config lock poisoned: {}", e)))?;
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load_config()?;

        let mut write_lock = self
            .config
            .write()
            .map_err(|e| ReverieError::internal(format!("Config lock poisoned: {}", e)))?;
        *write_lock = Some(loaded.clone());

        Ok(loaded)
    }

    fn load_config(&self) -> Result<ReverieConfig> {
        let document = AtomicDocument::<ReverieConfig>::new(self.path.clone(), DocumentFormat::Toml);
        match document.load()? {
            Some(config) => {
                tracing::debug!("Loaded configuration from {:?}", self.path);
                Ok(config)
            }
            None => {
                tracing::debug!("No configuration at {:?}, using defaults", self.path);
                Ok(ReverieConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("config.toml"));
        assert_eq!(service.get_config().unwrap(), ReverieConfig::default());
    }

    #[test]
    fn test_config_is_loaded_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[dreaming]\nmin_failures = 5\n").unwrap();

        let service = ConfigService::new(path.clone());
        assert_eq!(service.get_config().unwrap().dreaming.min_failures, 5);

        std::fs::write(&path, "[dreaming]\nmin_failures = 7\n").unwrap();
        assert_eq!(service.get_config().unwrap().dreaming.min_failures, 5);

        let fresh = ConfigService::new(path);
        assert_eq!(fresh.get_config().unwrap().dreaming.min_failures, 7);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[dreaming\nmin_failures = ").unwrap();
        let service = ConfigService::new(path);
        assert!(service.get_config().is_err());
    }
}
