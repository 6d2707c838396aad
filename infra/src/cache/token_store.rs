//! Redis-backed revocation and rotation store
//!
//! Every record is a key whose TTL equals its retention window, so Redis
//! drops lapsed entries on its own and the purge operations report zero.
//! Rotation uses `SET NX EX` with a per-call marker value, which makes the
//! consume test-and-set atomic across every engine instance sharing the
//! server and keeps a retried write from reporting a loss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use tk_core::errors::StoreError;
use tk_core::repositories::{RevocationStore, RotationStore};

use super::RedisClient;

const REVOKED_PREFIX: &str = "revoked";
const CONSUMED_PREFIX: &str = "rotated";
const ROTATABLE_PREFIX: &str = "rotatable";

/// Shortest TTL written, so a record is never created already expired
const MIN_TTL_SECONDS: u64 = 1;

/// Token store keeping revocation and rotation records in Redis
#[derive(Debug, Clone)]
pub struct RedisTokenStore {
    client: RedisClient,
}

impl RedisTokenStore {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Underlying client, for health checks
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    fn key(&self, prefix: &str, token_id: Uuid) -> String {
        self.client
            .config()
            .make_key(&format!("{}:{}", prefix, token_id))
    }

    /// Whole seconds from now until `expires_at`, at least [`MIN_TTL_SECONDS`]
    pub(crate) fn ttl_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let remaining = (expires_at - now).num_seconds();
        u64::try_from(remaining)
            .unwrap_or(0)
            .max(MIN_TTL_SECONDS)
    }
}

#[async_trait]
impl RevocationStore for RedisTokenStore {
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.client.exists(&self.key(REVOKED_PREFIX, token_id)).await?)
    }

    async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(REVOKED_PREFIX, token_id);
        let mut ttl = Self::ttl_seconds(expires_at, Utc::now());

        // Re-revoking never shortens the retention already in place
        if let Some(current) = self.client.ttl(&key).await? {
            ttl = ttl.max(u64::try_from(current).unwrap_or(0));
        }

        self.client
            .set_with_expiry(&key, &expires_at.timestamp().to_string(), ttl)
            .await?;

        debug!(token_id = %token_id, ttl_seconds = ttl, "Revocation recorded in Redis");
        Ok(())
    }

    async fn mark_rotatable(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ttl = Self::ttl_seconds(expires_at, Utc::now());
        self.client
            .set_with_expiry(&self.key(ROTATABLE_PREFIX, token_id), "1", ttl)
            .await?;
        Ok(())
    }

    async fn is_rotatable(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.client.exists(&self.key(ROTATABLE_PREFIX, token_id)).await?)
    }
}

#[async_trait]
impl RotationStore for RedisTokenStore {
    async fn try_consume(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let ttl = Self::ttl_seconds(expires_at, Utc::now());
        // unique per attempt so a retried write is recognised as our own
        let marker = Uuid::new_v4().to_string();
        let won = self
            .client
            .set_nx_with_expiry(&self.key(CONSUMED_PREFIX, token_id), &marker, ttl)
            .await?;

        debug!(token_id = %token_id, won, "Consume attempted in Redis");
        Ok(won)
    }

    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.client.exists(&self.key(CONSUMED_PREFIX, token_id)).await?)
    }
}
