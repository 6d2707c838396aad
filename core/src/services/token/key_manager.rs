//! Signing key management for HMAC and RSA algorithms

use std::fs;
use std::path::{Path, PathBuf};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::errors::DomainError;

/// Family of key an algorithm needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// HS256/HS384/HS512, shared secret
    Hmac,
    /// RS256/RS384/RS512 and PS256/PS384/PS512, PEM key pair
    Rsa,
    Unsupported,
}

impl KeyFamily {
    pub fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => KeyFamily::Rsa,
            _ => KeyFamily::Unsupported,
        }
    }
}

/// Encoding and decoding keys used by the codec
#[derive(Clone)]
pub struct KeyMaterial {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    family: KeyFamily,
    /// Source files for RSA keys loaded from disk
    key_paths: Option<(PathBuf, PathBuf)>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("family", &self.family)
            .field("key_paths", &self.key_paths)
            .finish()
    }
}

impl KeyMaterial {
    /// Keys for HMAC algorithms
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            family: KeyFamily::Hmac,
            key_paths: None,
        }
    }

    /// RSA keys from PEM files
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tk_core::services::token::KeyMaterial;
    ///
    /// let keys = KeyMaterial::from_rsa_files(
    ///     "keys/jwt_private_key.pem",
    ///     "keys/jwt_public_key.pem",
    /// )?;
    /// # Ok::<(), tk_core::errors::DomainError>(())
    /// ```
    pub fn from_rsa_files<P: AsRef<Path>>(
        private_key_path: P,
        public_key_path: P,
    ) -> Result<Self, DomainError> {
        let private_key_path = private_key_path.as_ref().to_path_buf();
        let public_key_path = public_key_path.as_ref().to_path_buf();

        let private_key_pem = fs::read(&private_key_path)
            .map_err(|e| key_error(format!("Failed to read private key: {}", e)))?;
        let public_key_pem = fs::read(&public_key_path)
            .map_err(|e| key_error(format!("Failed to read public key: {}", e)))?;

        let mut keys = Self::from_rsa_pem(&private_key_pem, &public_key_pem)?;
        keys.key_paths = Some((private_key_path, public_key_path));
        Ok(keys)
    }

    /// RSA keys from PEM bytes, for embedded keys and tests
    pub fn from_rsa_pem(private_key_pem: &[u8], public_key_pem: &[u8]) -> Result<Self, DomainError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| key_error(format!("Invalid private key format: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| key_error(format!("Invalid public key format: {}", e)))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            family: KeyFamily::Rsa,
            key_paths: None,
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Whether these keys can sign and verify `algorithm`
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        KeyFamily::of(algorithm) == self.family
    }

    /// Reload RSA keys from their source files; no-op for in-memory keys
    pub fn reload(&mut self) -> Result<(), DomainError> {
        let Some((private_key_path, public_key_path)) = self.key_paths.clone() else {
            return Ok(());
        };

        *self = Self::from_rsa_files(private_key_path, public_key_path)?;
        Ok(())
    }
}

fn key_error(message: String) -> DomainError {
    DomainError::Internal { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_families() {
        assert_eq!(KeyFamily::of(Algorithm::HS512), KeyFamily::Hmac);
        assert_eq!(KeyFamily::of(Algorithm::PS256), KeyFamily::Rsa);
        assert_eq!(KeyFamily::of(Algorithm::ES256), KeyFamily::Unsupported);
    }

    #[test]
    fn test_secret_keys_support_hmac_only() {
        let keys = KeyMaterial::from_secret(b"secret");
        assert!(keys.supports(Algorithm::HS256));
        assert!(!keys.supports(Algorithm::RS256));
    }

    #[test]
    fn test_missing_rsa_files() {
        let err = KeyMaterial::from_rsa_files("/nonexistent/private.pem", "/nonexistent/public.pem")
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal { .. }));
    }

    #[test]
    fn test_invalid_rsa_pem() {
        assert!(KeyMaterial::from_rsa_pem(b"not a key", b"not a key").is_err());
    }

    #[test]
    fn test_reload_without_files_is_noop() {
        let mut keys = KeyMaterial::from_secret(b"secret");
        assert!(keys.reload().is_ok());
        assert_eq!(keys.family(), KeyFamily::Hmac);
    }
}
