//! Token engine configuration

use serde::{Deserialize, Serialize};

/// Secret shipped with the defaults; never valid outside development
pub const DEFAULT_SECRET: &str = "development-secret-please-change-in-production";

/// Signing, expiry and feature settings consumed by the token engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Shared secret for HMAC algorithms
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Algorithm used when signing new tokens (default: HS256)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Algorithms accepted during verification
    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<String>,

    /// Access token expiry time in seconds
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64,

    /// Refresh token expiry time in seconds
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64,

    /// Absolute ceiling for an access token in seconds
    #[serde(default = "default_access_max_lifetime")]
    pub access_max_lifetime: i64,

    /// Absolute ceiling for a refresh session in seconds, never extended by rotation
    #[serde(default = "default_refresh_max_lifetime")]
    pub refresh_max_lifetime: i64,

    /// `iss` claim written and enforced
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// `aud` claim written and enforced
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Whether tokens can be revoked
    #[serde(default = "default_true")]
    pub revocation_enabled: bool,

    /// Whether refresh tokens can be rotated
    #[serde(default = "default_true")]
    pub rotation_enabled: bool,

    /// Sweep interval for expired revocation/rotation records in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Tolerated clock skew in seconds
    #[serde(default)]
    pub clock_skew: i64,

    /// PEM private key path for RSA algorithms
    #[serde(default)]
    pub private_key_path: Option<String>,

    /// PEM public key path for RSA algorithms
    #[serde(default)]
    pub public_key_path: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            algorithm: default_algorithm(),
            allowed_algorithms: default_allowed_algorithms(),
            access_token_expiry: default_access_expiry(),
            refresh_token_expiry: default_refresh_expiry(),
            access_max_lifetime: default_access_max_lifetime(),
            refresh_max_lifetime: default_refresh_max_lifetime(),
            issuer: default_issuer(),
            audience: default_audience(),
            revocation_enabled: true,
            rotation_enabled: true,
            cleanup_interval: default_cleanup_interval(),
            clock_skew: 0,
            private_key_path: None,
            public_key_path: None,
        }
    }
}

impl TokenConfig {
    /// Create a new token configuration with secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let allowed_algorithms = std::env::var("JWT_ALLOWED_ALGORITHMS")
            .map(|raw| {
                raw.split(',')
                    .map(|alg| alg.trim().to_string())
                    .filter(|alg| !alg.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_algorithms);

        Self {
            secret: std::env::var("JWT_SECRET").unwrap_or(defaults.secret),
            algorithm: std::env::var("JWT_ALGORITHM").unwrap_or(defaults.algorithm),
            allowed_algorithms,
            access_token_expiry: env_or("JWT_ACCESS_TOKEN_EXPIRY", defaults.access_token_expiry),
            refresh_token_expiry: env_or("JWT_REFRESH_TOKEN_EXPIRY", defaults.refresh_token_expiry),
            access_max_lifetime: env_or("JWT_ACCESS_MAX_LIFETIME", defaults.access_max_lifetime),
            refresh_max_lifetime: env_or("JWT_REFRESH_MAX_LIFETIME", defaults.refresh_max_lifetime),
            issuer: std::env::var("JWT_ISSUER").unwrap_or(defaults.issuer),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or(defaults.audience),
            revocation_enabled: env_or("TOKEN_REVOCATION_ENABLED", defaults.revocation_enabled),
            rotation_enabled: env_or("TOKEN_ROTATION_ENABLED", defaults.rotation_enabled),
            cleanup_interval: env_or("TOKEN_CLEANUP_INTERVAL", defaults.cleanup_interval),
            clock_skew: env_or("JWT_CLOCK_SKEW", defaults.clock_skew),
            private_key_path: std::env::var("JWT_PRIVATE_KEY_PATH").ok(),
            public_key_path: std::env::var("JWT_PUBLIC_KEY_PATH").ok(),
        }
    }

    /// Set access token expiry in minutes
    pub fn with_access_expiry_minutes(mut self, minutes: i64) -> Self {
        self.access_token_expiry = minutes * 60;
        self
    }

    /// Set refresh token expiry in days
    pub fn with_refresh_expiry_days(mut self, days: i64) -> Self {
        self.refresh_token_expiry = days * 86400;
        self
    }

    /// Check if using default secret (security warning)
    pub fn is_using_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

fn default_secret() -> String {
    String::from(DEFAULT_SECRET)
}

fn default_algorithm() -> String {
    String::from("HS256")
}

fn default_allowed_algorithms() -> Vec<String> {
    vec![default_algorithm()]
}

fn default_access_expiry() -> i64 {
    900 // 15 minutes
}

fn default_refresh_expiry() -> i64 {
    604800 // 7 days
}

fn default_access_max_lifetime() -> i64 {
    3600 // 1 hour
}

fn default_refresh_max_lifetime() -> i64 {
    2592000 // 30 days
}

fn default_issuer() -> String {
    String::from("tokenkeep")
}

fn default_audience() -> String {
    String::from("tokenkeep-api")
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    60
}
