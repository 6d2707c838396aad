//! Mock token store for testing failure and latency paths

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::StoreError;

use super::memory::MemoryTokenStore;
use super::r#trait::{RevocationStore, RotationStore};

/// Memory-backed store that can be switched offline or slowed down
#[derive(Clone, Default)]
pub struct MockTokenStore {
    inner: MemoryTokenStore,
    unavailable: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
}

impl MockTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of calls that reached the store
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("mock store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for MockTokenStore {
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, StoreError> {
        self.enter().await?;
        self.inner.is_revoked(token_id).await
    }

    async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.revoke(token_id, expires_at).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.enter().await?;
        self.inner.purge_expired().await
    }
}

#[async_trait]
impl RotationStore for MockTokenStore {
    async fn try_consume(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.enter().await?;
        self.inner.try_consume(token_id, expires_at).await
    }

    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        self.enter().await?;
        self.inner.is_consumed(token_id).await
    }

    async fn purge_consumed(&self) -> Result<usize, StoreError> {
        self.enter().await?;
        self.inner.purge_consumed().await
    }
}
