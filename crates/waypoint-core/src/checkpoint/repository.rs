//! Stored recovery point repository trait.

use super::stored::StoredRecoveryPoint;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for server-side recovery points.
///
/// Points are immutable once created; there is no update operation.
#[async_trait]
pub trait RecoveryPointRepository: Send + Sync {
    async fn create(&self, point: &StoredRecoveryPoint) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredRecoveryPoint>>;

    /// Points attached to `session_id`, oldest first.
    async fn find_by_session(&self, session_id: &str) -> Result<Vec<StoredRecoveryPoint>>;

    /// Points owned by `owner_id`, oldest first.
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<StoredRecoveryPoint>>;
}
