//! Atomic file operations.
//!
//! Provides a thin layer for crash-safe writes of session documents and
//! behavior payloads: write to a sibling temp file, fsync, then rename over the
//! target while holding an advisory lock.

use reverie_core::ReverieError;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Errors that can occur during atomic file operations.
#[derive(Debug)]
pub enum AtomicFileError {
    /// File I/O error.
    IoError(std::io::Error),
    /// JSON serialization/deserialization error.
    JsonError(serde_json::Error),
    /// TOML deserialization error.
    TomlError(toml::de::Error),
    /// TOML serialization error.
    TomlSerError(toml::ser::Error),
    /// File locking error.
    LockError(String),
}

impl std::fmt::Display for AtomicFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicFileError::IoError(e) => write!(f, "I/O error: {}", e),
            AtomicFileError::JsonError(e) => write!(f, "JSON error: {}", e),
            AtomicFileError::TomlError(e) => write!(f, "TOML parse error: {}", e),
            AtomicFileError::TomlSerError(e) => write!(f, "TOML serialization error: {}", e),
            AtomicFileError::LockError(e) => write!(f, "Lock error: {}", e),
        }
    }
}

impl std::error::Error for AtomicFileError {}

impl From<std::io::Error> for AtomicFileError {
    fn from(e: std::io::Error) -> Self {
        AtomicFileError::IoError(e)
    }
}

impl From<serde_json::Error> for AtomicFileError {
    fn from(e: serde_json::Error) -> Self {
        AtomicFileError::JsonError(e)
    }
}

impl From<toml::de::Error> for AtomicFileError {
    fn from(e: toml::de::Error) -> Self {
        AtomicFileError::TomlError(e)
    }
}

impl From<toml::ser::Error> for AtomicFileError {
    fn from(e: toml::ser::Error) -> Self {
        AtomicFileError::TomlSerError(e)
    }
}

impl From<AtomicFileError> for ReverieError {
    fn from(e: AtomicFileError) -> Self {
        match e {
            AtomicFileError::IoError(io) => io.into(),
            AtomicFileError::JsonError(json) => json.into(),
            AtomicFileError::TomlError(toml) => toml.into(),
            AtomicFileError::TomlSerError(toml) => toml.into(),
            AtomicFileError::LockError(message) => ReverieError::io(message),
        }
    }
}

/// A handle to a plain text file with atomic replace semantics.
///
/// New content goes to a sibling `.<name>.tmp` file and is renamed over the
/// target, so until the rename the previous content is untouched on disk.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. Returns `None` if it doesn't exist.
    pub fn read(&self) -> Result<Option<String>, AtomicFileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    /// Replaces the file content atomically.
    ///
    /// On failure the target keeps its previous content and the temp file is removed.
    pub fn write(&self, content: &str) -> Result<(), AtomicFileError> {
        let _lock = FileLock::acquire(&self.path)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.sibling_path("tmp")?;
        let result = write_synced(&tmp_path, content)
            .and_then(|()| fs::rename(&tmp_path, &self.path).map_err(AtomicFileError::from));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    /// Returns `.<file_name>.<suffix>` in the same directory as the target.
    fn sibling_path(&self, suffix: &str) -> Result<PathBuf, AtomicFileError> {
        let file_name = self.path.file_name().ok_or_else(|| {
            AtomicFileError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no file name",
            ))
        })?;

        let sibling = format!(".{}.{}", file_name.to_string_lossy(), suffix);
        Ok(match self.path.parent() {
            Some(parent) => parent.join(sibling),
            None => PathBuf::from(sibling),
        })
    }
}

fn write_synced(path: &Path, content: &str) -> Result<(), AtomicFileError> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// On-disk encoding of a structured document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

/// A typed document stored through [`AtomicFile`].
pub struct AtomicDocument<T> {
    file: AtomicFile,
    format: DocumentFormat,
    _phantom: PhantomData<T>,
}

impl<T> AtomicDocument<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf, format: DocumentFormat) -> Self {
        Self {
            file: AtomicFile::new(path),
            format,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Loads and deserializes the document.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>, AtomicFileError> {
        let Some(content) = self.file.read()? else {
            return Ok(None);
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let data = match self.format {
            DocumentFormat::Json => serde_json::from_str(&content)?,
            DocumentFormat::Toml => toml::from_str(&content)?,
        };
        Ok(Some(data))
    }

    /// Serializes and saves the document atomically.
    pub fn save(&self, data: &T) -> Result<(), AtomicFileError> {
        let content = match self.format {
            DocumentFormat::Json => serde_json::to_string_pretty(data)?,
            DocumentFormat::Toml => toml::to_string_pretty(data)?,
        };
        self.file.write(&content)
    }
}

/// A file lock guard that automatically releases the lock when dropped.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquires an exclusive lock next to the given path.
    fn acquire(path: &Path) -> Result<Self, AtomicFileError> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| AtomicFileError::LockError(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock is automatic when the file handle is dropped
        let _ = fs::remove_file(&self.lock_path);
    }
}
