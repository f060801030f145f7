//! In-memory `SessionRepository`, for tests and embedded hosts without a disk.

use async_trait::async_trait;
use reverie_core::error::Result;
use reverie_core::session::{Session, SessionRepository};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_read_after_write() {
        let repo = InMemorySessionRepository::new();
        let session = Session::new("s-1", "patrol", "robot-1", Utc::now());
        repo.save(&session).await.unwrap();
        assert_eq!(repo.find_by_id("s-1").await.unwrap(), Some(session));
        assert_eq!(repo.list_all().await.unwrap().len(), 1);

        repo.delete("s-1").await.unwrap();
        assert!(repo.list_all().await.unwrap().is_empty());
    }
}
