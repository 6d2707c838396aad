//! # Infrastructure Layer
//!
//! Networked backends for TokenKeep revocation and rotation state. Both
//! implement the store traits from `tk_core::repositories`, so the token
//! engine treats them exactly like the in-memory store.
//!
//! - **Cache**: Redis client with retry/backoff and [`cache::RedisTokenStore`]
//! - **Database**: MySQL pool and [`database::MySqlTokenStore`]
//!
//! ## Features
//!
//! - `mysql`: Enable the MySQL store (default)
//! - `redis-cache`: Enable the Redis store (default)

use std::sync::Arc;

use tk_core::errors::StoreError;
use tk_core::repositories::MemoryTokenStore;
use tk_core::services::token::TokenService;
use tk_shared::config::{StoreBackend, StoreConfig};

/// Cache module - Redis client and token store
pub mod cache;

/// Database module - MySQL pool and token store
#[cfg(feature = "mysql")]
pub mod database;

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<InfrastructureError> for StoreError {
    fn from(err: InfrastructureError) -> Self {
        StoreError::unavailable(err.to_string())
    }
}

/// A connected revocation/rotation backend
#[derive(Clone)]
pub enum TokenStore {
    Memory(Arc<MemoryTokenStore>),
    Redis(Arc<cache::RedisTokenStore>),
    #[cfg(feature = "mysql")]
    Mysql(Arc<database::MySqlTokenStore>),
}

impl TokenStore {
    /// Connect the backend selected by `config.backend`
    pub async fn connect(config: &StoreConfig) -> Result<Self, InfrastructureError> {
        tracing::info!(backend = ?config.backend, "Connecting token store");

        match config.backend {
            StoreBackend::Memory => Ok(TokenStore::Memory(Arc::new(MemoryTokenStore::new()))),
            StoreBackend::Redis => {
                let client = cache::RedisClient::new(config.cache.clone()).await?;
                Ok(TokenStore::Redis(Arc::new(cache::RedisTokenStore::new(client))))
            }
            #[cfg(feature = "mysql")]
            StoreBackend::Mysql => {
                let pool = database::DatabasePool::new(config.database.clone()).await?;
                let store = database::MySqlTokenStore::new(pool.get_pool().clone());
                store.ensure_schema().await?;
                Ok(TokenStore::Mysql(Arc::new(store)))
            }
            #[cfg(not(feature = "mysql"))]
            StoreBackend::Mysql => Err(InfrastructureError::Config(
                "MySQL store requires the `mysql` feature".to_string(),
            )),
        }
    }

    /// Attach this backend to a token service for both revocation and rotation
    pub fn attach(&self, service: TokenService) -> TokenService {
        match self {
            TokenStore::Memory(store) => service.with_store(Arc::clone(store)),
            TokenStore::Redis(store) => service.with_store(Arc::clone(store)),
            #[cfg(feature = "mysql")]
            TokenStore::Mysql(store) => service.with_store(Arc::clone(store)),
        }
    }

    /// Backend name for logs and health reports
    pub fn backend(&self) -> StoreBackend {
        match self {
            TokenStore::Memory(_) => StoreBackend::Memory,
            TokenStore::Redis(_) => StoreBackend::Redis,
            #[cfg(feature = "mysql")]
            TokenStore::Mysql(_) => StoreBackend::Mysql,
        }
    }
}
