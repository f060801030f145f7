//! Session repository trait.
//!
//! Defines the interface for session persistence operations.

use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for recorded sessions.
///
/// Decouples the recorder and the search from the storage mechanism
/// (JSON files, in-memory map, remote store).
///
/// # Implementation Notes
///
/// Implementations must provide read-after-write consistency for a single
/// session id: once `save` returns, `find_by_id` and `list_all` observe the
/// saved document.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Saves (inserts or replaces) a session.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Deletes a session from storage. Deleting a missing session is not an error.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists all stored sessions, in no particular order.
    async fn list_all(&self) -> Result<Vec<Session>>;
}
