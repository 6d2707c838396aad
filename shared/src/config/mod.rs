//! Configuration module
//!
//! - `token` - Signing keys, expiry windows and engine feature flags
//! - `cache` - Redis settings for the networked revocation store
//! - `database` - MySQL settings for the relational revocation store
//! - `environment` - Environment detection and logging configuration

pub mod cache;
pub mod database;
pub mod environment;
pub mod token;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use cache::CacheConfig;
pub use database::DatabaseConfig;
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use token::TokenConfig;

/// Prefix of environment variables overriding file configuration
pub const ENV_PREFIX: &str = "TOKENKEEP";

/// Which backend holds revocation and rotation records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store with a background sweep
    #[default]
    Memory,
    /// Redis with key TTLs
    Redis,
    /// MySQL tables with query-time expiry filtering
    Mysql,
}

/// Revocation/rotation store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Selected backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis settings, used when `backend = "redis"`
    #[serde(default)]
    pub cache: CacheConfig,

    /// MySQL settings, used when `backend = "mysql"`
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Complete configuration combining all sub-configurations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: Environment,

    /// Token engine configuration
    #[serde(default)]
    pub token: TokenConfig,

    /// Revocation/rotation store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration in layers: defaults, an optional TOML file, then
    /// `TOKENKEEP__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("token.allowed_algorithms")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject settings unsafe for the configured environment
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.environment.requires_explicit_secret() && self.token.is_using_default_secret() {
            return Err(config::ConfigError::Message(format!(
                "the default signing secret is not allowed in {}",
                self.environment
            )));
        }
        Ok(())
    }

    /// Load configuration from plain environment variables (`.env` honoured)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let environment = Environment::from_env();
        let backend = std::env::var("TOKEN_STORE_BACKEND")
            .ok()
            .and_then(|raw| match raw.to_lowercase().as_str() {
                "memory" => Some(StoreBackend::Memory),
                "redis" => Some(StoreBackend::Redis),
                "mysql" => Some(StoreBackend::Mysql),
                _ => None,
            })
            .unwrap_or_default();

        Self {
            environment,
            token: TokenConfig::from_env(),
            store: StoreConfig {
                backend,
                cache: CacheConfig::from_env(),
                database: DatabaseConfig::from_env(),
            },
            logging: LoggingConfig::from_env(environment),
        }
    }
}
