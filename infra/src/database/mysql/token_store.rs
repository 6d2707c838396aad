//! MySQL implementation of the revocation and rotation stores.
//!
//! Records live in two tables keyed by token id. Lookups ignore rows whose
//! retention has lapsed, and the purge operations delete them. The primary
//! key makes `INSERT IGNORE` an atomic test-and-set for rotation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tracing::{debug, error};
use uuid::Uuid;

use tk_core::errors::StoreError;
use tk_core::repositories::{RevocationStore, RotationStore};

use crate::InfrastructureError;

const CREATE_REVOKED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS revoked_tokens (
    token_id CHAR(36) NOT NULL PRIMARY KEY,
    expires_at DATETIME(6) NOT NULL,
    revoked_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
    INDEX idx_revoked_tokens_expires_at (expires_at)
)
"#;

const CREATE_ROTATED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rotated_tokens (
    token_id CHAR(36) NOT NULL PRIMARY KEY,
    expires_at DATETIME(6) NOT NULL,
    consumed_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
    INDEX idx_rotated_tokens_expires_at (expires_at)
)
"#;

/// MySQL-backed token store
///
/// `mark_rotatable`/`is_rotatable` are not supported by this backend.
#[derive(Debug, Clone)]
pub struct MySqlTokenStore {
    /// Database connection pool
    pool: MySqlPool,
}

impl MySqlTokenStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the store tables if they are missing
    pub async fn ensure_schema(&self) -> Result<(), InfrastructureError> {
        for statement in [CREATE_REVOKED_TABLE, CREATE_ROTATED_TABLE] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Token store schema ready");
        Ok(())
    }
}

fn database_error(operation: &str, err: sqlx::Error) -> StoreError {
    error!("MySQL token store {} failed: {}", operation, err);
    InfrastructureError::Database(err).into()
}

#[async_trait]
impl RevocationStore for MySqlTokenStore {
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, StoreError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM revoked_tokens WHERE token_id = ? AND expires_at > ?",
        )
        .bind(token_id.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("is_revoked", e))?;

        Ok(row.is_some())
    }

    async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_id, expires_at)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE expires_at = GREATEST(expires_at, VALUES(expires_at))
            "#,
        )
        .bind(token_id.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("revoke", e))?;

        debug!(token_id = %token_id, "Revocation recorded in MySQL");
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("purge_expired", e))?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl RotationStore for MySqlTokenStore {
    async fn try_consume(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT IGNORE INTO rotated_tokens (token_id, expires_at) VALUES (?, ?)")
            .bind(token_id.to_string())
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("try_consume", e))?;

        let won = result.rows_affected() == 1;
        debug!(token_id = %token_id, won, "Consume attempted in MySQL");
        Ok(won)
    }

    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM rotated_tokens WHERE token_id = ? AND expires_at > ?",
        )
        .bind(token_id.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("is_consumed", e))?;

        Ok(row.is_some())
    }

    async fn purge_consumed(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM rotated_tokens WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("purge_consumed", e))?;

        Ok(result.rows_affected() as usize)
    }
}
