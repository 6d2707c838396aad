//! Store traits backing token revocation and one-time refresh rotation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;

/// Persistence contract for revoked token ids
///
/// Entries are keyed by token id (`jti`) and carry the instant after which the
/// entry may be forgotten. Implementations must be safe to share across tasks.
///
/// # Consistency
/// - An entry is reported as revoked at least until its retention passes;
///   after that it may disappear at any time
/// - `revoke` is idempotent; re-revoking keeps the later expiry
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Check whether a token id has been revoked
    ///
    /// # Returns
    /// * `Ok(true)` - Token id is on the revocation list
    /// * `Ok(false)` - Token id is unknown
    /// * `Err(StoreError)` - Backend could not answer
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, StoreError>;

    /// Record a token id as revoked until `expires_at`
    ///
    /// # Example
    /// ```no_run
    /// # use chrono::{Duration, Utc};
    /// # use uuid::Uuid;
    /// # use tk_core::repositories::RevocationStore;
    /// # async fn example(store: &impl RevocationStore) -> Result<(), Box<dyn std::error::Error>> {
    /// let token_id = Uuid::new_v4();
    /// store.revoke(token_id, Utc::now() + Duration::hours(1)).await?;
    /// assert!(store.is_revoked(token_id).await?);
    /// # Ok(())
    /// # }
    /// ```
    async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Mark a refresh token id as eligible for rotation tracking
    ///
    /// Optional capability; backends that do not track it report `Unsupported`.
    async fn mark_rotatable(
        &self,
        _token_id: Uuid,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unsupported {
            operation: "mark_rotatable",
        })
    }

    /// Check whether a refresh token id was marked rotatable
    async fn is_rotatable(&self, _token_id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported {
            operation: "is_rotatable",
        })
    }

    /// Delete entries whose retention has passed
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of entries removed
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Persistence contract for consumed refresh token ids
///
/// Consumption is a single atomic test-and-set: of any number of concurrent
/// `try_consume` calls for the same id, exactly one observes `true`.
#[async_trait]
pub trait RotationStore: Send + Sync {
    /// Atomically mark a token id as consumed
    ///
    /// # Returns
    /// * `Ok(true)` - This call consumed the id
    /// * `Ok(false)` - The id was already consumed
    /// * `Err(StoreError)` - Backend could not answer; nothing was consumed
    async fn try_consume(&self, token_id: Uuid, expires_at: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Check whether a token id has already been consumed
    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError>;

    /// Delete consumed entries whose retention has passed
    async fn purge_consumed(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
