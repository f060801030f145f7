//! JSON directory implementation of `SessionRepository`.
//!
//! Directory structure:
//! ```text
//! base_dir/
//! └── sessions/
//!     ├── <session-id-1>.json
//!     └── <session-id-2>.json
//! ```

use crate::storage::{AtomicDocument, DocumentFormat};
use async_trait::async_trait;
use reverie_core::error::{ReverieError, Result};
use reverie_core::session::{Session, SessionRepository};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores one JSON document per session.
///
/// Writes go through [`AtomicDocument`] on the blocking pool, so a session file
/// is either the previous version or the new one, never a torn write.
pub struct FileSessionRepository {
    sessions_dir: PathBuf,
}

impl FileSessionRepository {
    /// Creates a repository rooted at `base_dir`, creating `sessions/` if needed.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = base_dir.as_ref().join("sessions");
        fs::create_dir_all(&sessions_dir).await?;
        Ok(Self { sessions_dir })
    }

    /// Creates a repository at the default data location.
    pub async fn default_location() -> Result<Self> {
        let base_dir = crate::paths::ReveriePaths::data_dir()
            .map_err(|e| ReverieError::config(format!("Failed to get data directory: {}", e)))?;
        Self::new(base_dir).await
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        // Session ids become file names; reject anything that could escape the directory
        if session_id.is_empty()
            || session_id.contains(['/', '\\'])
            || session_id.starts_with('.')
        {
            return Err(ReverieError::internal(format!(
                "Invalid session id for file storage: '{}'",
                session_id
            )));
        }
        Ok(self.sessions_dir.join(format!("{}.json", session_id)))
    }

    async fn load_document(path: PathBuf) -> Result<Option<Session>> {
        tokio::task::spawn_blocking(move || {
            AtomicDocument::<Session>::new(path, DocumentFormat::Json)
                .load()
                .map_err(ReverieError::from)
        })
        .await
        .map_err(|e| ReverieError::internal(format!("Failed to join task: {}", e)))?
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_path(session_id)?;
        Self::load_document(path).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id)?;
        let session = session.clone();
        tokio::task::spawn_blocking(move || {
            AtomicDocument::<Session>::new(path, DocumentFormat::Json)
                .save(&session)
                .map_err(ReverieError::from)
        })
        .await
        .map_err(|e| ReverieError::internal(format!("Failed to join task: {}", e)))?
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let mut entries = fs::read_dir(&self.sessions_dir).await?;
        let mut sessions = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_document {
                continue;
            }

            match Self::load_document(path.clone()).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping unreadable session file {:?}: {}", path, e);
                    // Continue loading other sessions
                }
            }
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reverie_core::session::{Failure, Frame};
    use tempfile::TempDir;

    fn create_test_session(id: &str) -> Session {
        let now = Utc::now();
        let mut session = Session::new(id, "patrol", "robot-1", now);
        session.frames.push(Frame {
            timestamp: now,
            snapshot: serde_json::json!({ "obstacle_cm": 40.0, "target_speed": 0.5 }),
        });
        session.failures.push(Failure {
            failure_type: "collision".to_string(),
            description: "hit the doorframe".to_string(),
            timestamp: now,
            frame_index: 0,
        });
        session.ended_at = Some(now);
        session
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();

        let session = create_test_session("s-1");
        repo.save(&session).await.unwrap();

        let loaded = repo.find_by_id("s-1").await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_skips_corrupt_files() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();

        repo.save(&create_test_session("s-1")).await.unwrap();
        repo.save(&create_test_session("s-2")).await.unwrap();
        std::fs::write(repo.sessions_dir().join("broken.json"), "{ not json").unwrap();
        std::fs::write(repo.sessions_dir().join("notes.txt"), "ignored").unwrap();

        let mut ids: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["s-1".to_string(), "s-2".to_string()]);
    }

    #[tokio::test]
    async fn test_save_overwrites_and_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();

        let mut session = create_test_session("s-1");
        repo.save(&session).await.unwrap();
        session.failures.clear();
        repo.save(&session).await.unwrap();

        let loaded = repo.find_by_id("s-1").await.unwrap().unwrap();
        assert!(loaded.failures.is_empty());

        repo.delete("s-1").await.unwrap();
        repo.delete("s-1").await.unwrap();
        assert!(repo.find_by_id("s-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::new(temp_dir.path()).await.unwrap();
        assert!(repo.find_by_id("../escape").await.is_err());
        assert!(repo.find_by_id("").await.is_err());
    }
}
