//! Shared configuration and logging bootstrap for TokenKeep
//!
//! This crate provides functionality used across the workspace:
//! - Configuration types and layered loading
//! - Tracing subscriber initialisation

pub mod config;
pub mod logging;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, DatabaseConfig, Environment, LogFormat, LoggingConfig,
    StoreBackend, StoreConfig, TokenConfig,
};
pub use logging::init_tracing;
