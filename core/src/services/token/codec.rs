//! Compact JWS signing and parsing

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::entities::token::RawClaims;
use crate::errors::{DomainError, TokenError};

use super::key_manager::KeyMaterial;

/// Signs claim sets and authenticates token strings
///
/// Parsing never yields a partial claim set: the token is either rejected with
/// a [`TokenError`] or decoded into [`RawClaims`] for rule validation.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: KeyMaterial,
    algorithm: Algorithm,
    allowed_algorithms: Vec<Algorithm>,
}

impl TokenCodec {
    /// Create a codec signing with `algorithm` and accepting `allowed_algorithms`
    pub fn new(
        keys: KeyMaterial,
        algorithm: Algorithm,
        allowed_algorithms: Vec<Algorithm>,
    ) -> Result<Self, DomainError> {
        if !allowed_algorithms.contains(&algorithm) {
            return Err(DomainError::Internal {
                message: format!("signing algorithm {:?} is not in the allowed list", algorithm),
            });
        }
        if let Some(alg) = allowed_algorithms.iter().find(|alg| !keys.supports(**alg)) {
            return Err(DomainError::Internal {
                message: format!("configured keys cannot verify {:?}", alg),
            });
        }

        Ok(Self {
            keys,
            algorithm,
            allowed_algorithms,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// Sign `claims` into a compact token
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, self.keys.encoding_key())
            .map_err(|_| TokenError::TokenGenerationFailed)
    }

    /// Authenticate `token` and decode its claims
    ///
    /// Checks, in order: structure, header algorithm against the allow-list,
    /// signature, claim JSON. Temporal and semantic claim rules are left to
    /// [`RawClaims::validate`].
    pub fn decode(&self, token: &str) -> Result<RawClaims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
            return Err(TokenError::InvalidTokenFormat);
        }

        let header = decode_header(token).map_err(|_| self.unparsed_header_error(segments[0]))?;
        if !self.allowed_algorithms.contains(&header.alg) {
            debug!(algorithm = ?header.alg, "Rejected token signed with disallowed algorithm");
            return Err(TokenError::UnexpectedSigningMethod {
                algorithm: format!("{:?}", header.alg),
            });
        }

        decode::<RawClaims>(token, self.keys.decoding_key(), &self.validation(header.alg))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::InvalidSignature => TokenError::InvalidSignature,
                JwtErrorKind::InvalidAlgorithm => TokenError::UnexpectedSigningMethod {
                    algorithm: format!("{:?}", header.alg),
                },
                _ => TokenError::InvalidTokenFormat,
            })
    }

    /// Classify a header `jsonwebtoken` refused to parse
    ///
    /// An `alg` outside the allow-list (including names the library does not
    /// know, such as `none`) is reported as such; anything else is malformed.
    fn unparsed_header_error(&self, segment: &str) -> TokenError {
        #[derive(Deserialize)]
        struct AlgorithmOnly {
            alg: String,
        }

        let alg = URL_SAFE_NO_PAD
            .decode(segment)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<AlgorithmOnly>(&bytes).ok())
            .map(|header| header.alg);

        match alg {
            Some(alg) if !self.is_allowed(&alg) => {
                debug!(algorithm = %alg, "Rejected token signed with unsupported algorithm");
                TokenError::UnexpectedSigningMethod { algorithm: alg }
            }
            _ => TokenError::InvalidTokenFormat,
        }
    }

    fn is_allowed(&self, name: &str) -> bool {
        Algorithm::from_str(name)
            .map(|alg| self.allowed_algorithms.contains(&alg))
            .unwrap_or(false)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation
    }
}
