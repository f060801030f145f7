//! Behavior storage interface.
//!
//! A behavior is a stored, executable description of a robot skill. The engine
//! treats its payload as opaque text and addresses it by path.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Storage collaborator for behavior files.
#[async_trait]
pub trait BehaviorRepository: Send + Sync {
    /// Reads the current behavior payload stored at `path`.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Replaces the payload at `path`.
    ///
    /// The old content must stay recoverable until the write completes.
    async fn write_atomic(&self, path: &Path, payload: &str) -> Result<()>;
}

/// Derives the behavior name recorded in sessions from a behavior path.
///
/// `behaviors/patrol.skill` and `patrol` both map to `"patrol"`.
pub fn behavior_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
