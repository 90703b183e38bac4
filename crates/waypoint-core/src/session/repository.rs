//! Session repository trait.
//!
//! Defines the interface for session persistence operations.

use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for managing session persistence.
///
/// This trait decouples the lifecycle service from the specific storage
/// mechanism (versioned JSON files, in-memory maps, a remote document
/// store).
///
/// # Implementation Notes
///
/// Implementations must make [`SessionRepository::update`] an atomic
/// check-and-set on the stored revision.
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

    /// Stores a new session at revision 0.
    ///
    /// Fails with `Conflict` if the id is already taken.
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Replaces a stored session if its revision still equals
    /// `expected_revision`.
    ///
    /// # Returns
    ///
    /// - `Ok(Session)`: The stored copy, with its revision bumped
    /// - `Err(Conflict)`: Another writer got there first
    /// - `Err(NotFound)`: No such session
    async fn update(&self, session: &Session, expected_revision: u64) -> Result<Session>;

    /// Lists sessions owned by `owner_id`, most recently started first.
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Session>>;
}
