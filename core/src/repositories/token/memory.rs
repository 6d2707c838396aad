//! In-process revocation and rotation store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::StoreError;

use super::r#trait::{RevocationStore, RotationStore};

/// Token store kept in memory, suitable for single-process deployments and tests
///
/// Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    revoked: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
    rotatable: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
    consumed: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revocation entries currently held
    pub async fn revoked_count(&self) -> usize {
        self.revoked.read().await.len()
    }

    /// Number of consumed entries currently held
    pub async fn consumed_count(&self) -> usize {
        self.consumed.lock().await.len()
    }

    fn retain_live(map: &mut HashMap<Uuid, DateTime<Utc>>, now: DateTime<Utc>) -> usize {
        let before = map.len();
        map.retain(|_, expires_at| *expires_at > now);
        before - map.len()
    }
}

#[async_trait]
impl RevocationStore for MemoryTokenStore {
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.revoked.read().await.contains_key(&token_id))
    }

    async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut revoked = self.revoked.write().await;
        let entry = revoked.entry(token_id).or_insert(expires_at);
        if expires_at > *entry {
            *entry = expires_at;
        }
        Ok(())
    }

    async fn mark_rotatable(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.rotatable.write().await.insert(token_id, expires_at);
        Ok(())
    }

    async fn is_rotatable(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rotatable.read().await.contains_key(&token_id))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut removed = Self::retain_live(&mut *self.revoked.write().await, now);
        removed += Self::retain_live(&mut *self.rotatable.write().await, now);
        Ok(removed)
    }
}

#[async_trait]
impl RotationStore for MemoryTokenStore {
    async fn try_consume(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut consumed = self.consumed.lock().await;
        if consumed.contains_key(&token_id) {
            return Ok(false);
        }
        consumed.insert(token_id, expires_at);
        Ok(true)
    }

    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.consumed.lock().await.contains_key(&token_id))
    }

    async fn purge_consumed(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        Ok(Self::retain_live(&mut *self.consumed.lock().await, now))
    }
}
