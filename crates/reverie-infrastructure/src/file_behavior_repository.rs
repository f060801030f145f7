//! Filesystem implementation of `BehaviorRepository`.

use crate::storage::AtomicFile;
use async_trait::async_trait;
use reverie_core::behavior::BehaviorRepository;
use reverie_core::error::{ReverieError, Result};
use std::path::{Path, PathBuf};

/// Reads behaviors straight from disk and patches them through [`AtomicFile`].
///
/// Relative paths are resolved against `root` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct FileBehaviorRepository {
    root: Option<PathBuf>,
}

impl FileBehaviorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl BehaviorRepository for FileBehaviorRepository {
    async fn read(&self, path: &Path) -> Result<String> {
        let resolved = self.resolve(path);
        match tokio::fs::read_to_string(&resolved).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReverieError::not_found(
                "behavior",
                resolved.to_string_lossy(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, path: &Path, payload: &str) -> Result<()> {
        let resolved = self.resolve(path);
        let display = resolved.to_string_lossy().into_owned();
        let payload = payload.to_string();

        tokio::task::spawn_blocking(move || AtomicFile::new(resolved).write(&payload))
            .await
            .map_err(|e| ReverieError::internal(format!("Failed to join task: {}", e)))?
            .map_err(|e| ReverieError::patch_write(display, e.to_string()))?;

        tracing::debug!("Behavior patch written atomically");
        Ok(())
    }
}
