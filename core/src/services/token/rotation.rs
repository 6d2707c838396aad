//! Single-use semantics for refresh tokens

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::OperationContext;
use crate::errors::{DomainError, TokenError};
use crate::repositories::RotationStore;

/// Tracks consumed refresh tokens through an atomic test-and-set store
#[derive(Clone)]
pub struct RotationController {
    store: Arc<dyn RotationStore>,
}

impl RotationController {
    pub fn new(store: Arc<dyn RotationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RotationStore> {
        &self.store
    }

    /// Claim the right to rotate `token_id`
    ///
    /// Exactly one caller per token id succeeds; every other caller gets
    /// [`TokenError::TokenAlreadyRotated`]. The record is retained until
    /// `retain_until`.
    pub async fn consume(
        &self,
        ctx: &OperationContext,
        token_id: Uuid,
        retain_until: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let won = ctx.run(self.store.try_consume(token_id, retain_until)).await?;
        if !won {
            warn!(token_id = %token_id, "Refresh token reuse detected");
            return Err(TokenError::TokenAlreadyRotated.into());
        }

        info!(token_id = %token_id, "Refresh token consumed");
        Ok(())
    }

    /// Fail with [`TokenError::TokenAlreadyRotated`] if `token_id` was consumed
    pub async fn ensure_not_consumed(
        &self,
        ctx: &OperationContext,
        token_id: Uuid,
    ) -> Result<(), DomainError> {
        if ctx.run(self.store.is_consumed(token_id)).await? {
            return Err(TokenError::TokenAlreadyRotated.into());
        }
        Ok(())
    }
}
