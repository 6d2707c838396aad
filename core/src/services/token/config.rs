//! Configuration for the token service

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use jsonwebtoken::Algorithm;
use tk_shared::TokenConfig;

use crate::errors::DomainError;

use super::key_manager::{KeyFamily, KeyMaterial};

/// Validated, typed configuration for the token service
#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    /// Shared secret for HMAC algorithms
    pub jwt_secret: String,
    /// Algorithm used to sign new tokens
    pub algorithm: Algorithm,
    /// Algorithms accepted during verification
    pub allowed_algorithms: Vec<Algorithm>,
    /// Access token expiry
    pub access_token_expiry: Duration,
    /// Refresh token expiry
    pub refresh_token_expiry: Duration,
    /// Absolute ceiling for an access token
    pub access_max_lifetime: Duration,
    /// Absolute ceiling for a refresh session
    pub refresh_max_lifetime: Duration,
    pub issuer: String,
    pub audience: String,
    pub revocation_enabled: bool,
    pub rotation_enabled: bool,
    /// Sweep interval of the cleanup service
    pub cleanup_interval: StdDuration,
    /// Tolerated clock skew
    pub clock_skew: Duration,
    /// PEM private key path for RSA algorithms
    pub private_key_path: Option<String>,
    /// PEM public key path for RSA algorithms
    pub public_key_path: Option<String>,
}

impl Default for TokenServiceConfig {
    fn default() -> Self {
        Self {
            jwt_secret: tk_shared::config::token::DEFAULT_SECRET.to_string(),
            algorithm: Algorithm::HS256,
            allowed_algorithms: vec![Algorithm::HS256],
            access_token_expiry: Duration::minutes(15),
            refresh_token_expiry: Duration::days(7),
            access_max_lifetime: Duration::hours(1),
            refresh_max_lifetime: Duration::days(30),
            issuer: "tokenkeep".to_string(),
            audience: "tokenkeep-api".to_string(),
            revocation_enabled: true,
            rotation_enabled: true,
            cleanup_interval: StdDuration::from_secs(60),
            clock_skew: Duration::zero(),
            private_key_path: None,
            public_key_path: None,
        }
    }
}

impl TokenServiceConfig {
    /// Create a configuration signing with the given HMAC secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Default::default()
        }
    }

    /// Convert and validate the shared [`TokenConfig`]
    pub fn from_token_config(config: &TokenConfig) -> Result<Self, DomainError> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        let allowed_algorithms = config
            .allowed_algorithms
            .iter()
            .map(|name| parse_algorithm(name))
            .collect::<Result<Vec<_>, _>>()?;

        let service_config = Self {
            jwt_secret: config.secret.clone(),
            algorithm,
            allowed_algorithms,
            access_token_expiry: seconds("access_token_expiry", config.access_token_expiry)?,
            refresh_token_expiry: seconds("refresh_token_expiry", config.refresh_token_expiry)?,
            access_max_lifetime: seconds("access_max_lifetime", config.access_max_lifetime)?,
            refresh_max_lifetime: seconds("refresh_max_lifetime", config.refresh_max_lifetime)?,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            revocation_enabled: config.revocation_enabled,
            rotation_enabled: config.rotation_enabled,
            cleanup_interval: StdDuration::from_secs(config.cleanup_interval),
            clock_skew: seconds("clock_skew", config.clock_skew)?,
            private_key_path: config.private_key_path.clone(),
            public_key_path: config.public_key_path.clone(),
        };

        service_config.validate()?;
        Ok(service_config)
    }

    /// Builder: replace the verification allow-list
    pub fn with_allowed_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// Builder: sign with `algorithm`, also allow-listing it
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        if !self.allowed_algorithms.contains(&algorithm) {
            self.allowed_algorithms.push(algorithm);
        }
        self
    }

    /// Builder: toggle revocation
    pub fn with_revocation(mut self, enabled: bool) -> Self {
        self.revocation_enabled = enabled;
        self
    }

    /// Builder: toggle rotation
    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation_enabled = enabled;
        self
    }

    /// Builder: set clock skew tolerance
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.allowed_algorithms.is_empty() {
            return Err(internal("at least one algorithm must be allowed"));
        }
        if !self.allowed_algorithms.contains(&self.algorithm) {
            return Err(internal(format!(
                "signing algorithm {:?} is not in the allowed list",
                self.algorithm
            )));
        }

        let family = KeyFamily::of(self.algorithm);
        if self
            .allowed_algorithms
            .iter()
            .any(|alg| KeyFamily::of(*alg) != family)
        {
            return Err(internal("allowed algorithms must share one key family"));
        }

        for (name, value) in [
            ("access_token_expiry", self.access_token_expiry),
            ("refresh_token_expiry", self.refresh_token_expiry),
            ("access_max_lifetime", self.access_max_lifetime),
            ("refresh_max_lifetime", self.refresh_max_lifetime),
        ] {
            if value <= Duration::zero() {
                return Err(internal(format!("{} must be positive", name)));
            }
        }
        if self.clock_skew < Duration::zero() {
            return Err(internal("clock_skew must not be negative"));
        }

        let now = chrono::Utc::now();
        for (name, value) in [
            ("access_token_expiry", self.access_token_expiry),
            ("refresh_token_expiry", self.refresh_token_expiry),
            ("access_max_lifetime", self.access_max_lifetime),
            ("refresh_max_lifetime", self.refresh_max_lifetime),
            ("clock_skew", self.clock_skew),
        ] {
            if now.checked_add_signed(value).is_none() || now.checked_sub_signed(value).is_none() {
                return Err(internal(format!("{} is out of range", name)));
            }
        }
        if self.cleanup_interval.is_zero() {
            return Err(internal("cleanup_interval must be positive"));
        }

        match family {
            KeyFamily::Hmac if self.jwt_secret.is_empty() => {
                Err(internal("HMAC algorithms require a non-empty secret"))
            }
            KeyFamily::Unsupported => Err(internal(format!(
                "algorithm {:?} is not supported",
                self.algorithm
            ))),
            _ => Ok(()),
        }
    }

    /// Load the key material this configuration describes
    pub fn load_keys(&self) -> Result<KeyMaterial, DomainError> {
        match KeyFamily::of(self.algorithm) {
            KeyFamily::Hmac => Ok(KeyMaterial::from_secret(self.jwt_secret.as_bytes())),
            KeyFamily::Rsa => match (&self.private_key_path, &self.public_key_path) {
                (Some(private_key), Some(public_key)) => {
                    KeyMaterial::from_rsa_files(private_key, public_key)
                }
                _ => Err(internal("RSA algorithms require private and public key paths")),
            },
            KeyFamily::Unsupported => Err(internal(format!(
                "algorithm {:?} is not supported",
                self.algorithm
            ))),
        }
    }

    /// Retention for a revocation or rotation record of a token naturally
    /// expiring at `natural_expiry`, saturating at the latest representable
    /// instant
    pub(crate) fn retention_until(
        &self,
        natural_expiry: chrono::DateTime<chrono::Utc>,
    ) -> chrono::DateTime<chrono::Utc> {
        natural_expiry
            .checked_add_signed(self.clock_skew)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, DomainError> {
    Algorithm::from_str(name.trim()).map_err(|_| internal(format!("unknown algorithm: {}", name)))
}

fn seconds(name: &str, value: i64) -> Result<Duration, DomainError> {
    Duration::try_seconds(value).ok_or_else(|| internal(format!("{} is out of range", name)))
}

fn internal(message: impl Into<String>) -> DomainError {
    DomainError::Internal {
        message: message.into(),
    }
}
