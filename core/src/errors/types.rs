//! Error types for token handling, input validation and store access

use thiserror::Error;

/// Token-related errors
///
/// Every rejection path of parsing and claim validation maps to exactly one
/// variant, so callers can tell a tampered token from an expired one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidTokenFormat,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("unexpected signing method: {algorithm}")]
    UnexpectedSigningMethod { algorithm: String },

    #[error("missing required claim: {claim}")]
    MissingClaim { claim: &'static str },

    #[error("invalid claim: {claim}")]
    InvalidClaim { claim: &'static str },

    #[error("invalid token type")]
    InvalidTokenType,

    #[error("invalid role type")]
    InvalidRoleType,

    #[error("at least one role must be provided")]
    EmptyRoles,

    #[error("invalid issuer")]
    InvalidIssuer,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("issued in the future")]
    IssuedInFuture,

    #[error("not valid yet")]
    TokenNotYetValid,

    #[error("token is expired")]
    TokenExpired,

    #[error("exceeded maximum lifetime")]
    MaxLifetimeExceeded,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("token already rotated")]
    TokenAlreadyRotated,

    #[error("token generation failed")]
    TokenGenerationFailed,
}

/// Input validation errors raised before a token is minted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("subject must not be the nil UUID")]
    NilSubject,

    #[error("session id must not be the nil UUID")]
    NilSession,

    #[error("at least one role must be provided")]
    EmptyRoles,

    #[error("role at position {index} is empty")]
    EmptyRole { index: usize },

    #[error("username too long (max: {max}, actual: {actual})")]
    UsernameTooLong { max: usize, actual: usize },
}

/// Failures reported by revocation/rotation store backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("store does not support {operation}")]
    Unsupported { operation: &'static str },
}

impl StoreError {
    /// Shorthand for an unavailable-backend error
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }
}

/// Coarse classification of every failure the engine can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedToken,
    SignatureInvalid,
    AlgorithmRejected,
    ClaimMissing,
    ClaimMalformed,
    TypeMismatch,
    IssuerMismatch,
    IssuedInFuture,
    NotYetValid,
    Expired,
    LifetimeExceeded,
    Revoked,
    AlreadyRotated,
    FeatureDisabled,
    CanceledOrTimedOut,
    InvalidInput,
    StoreUnavailable,
    Internal,
}

impl TokenError {
    /// Classify this token error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::InvalidTokenFormat => ErrorKind::MalformedToken,
            TokenError::InvalidSignature => ErrorKind::SignatureInvalid,
            TokenError::UnexpectedSigningMethod { .. } => ErrorKind::AlgorithmRejected,
            TokenError::MissingClaim { .. } => ErrorKind::ClaimMissing,
            TokenError::InvalidClaim { .. }
            | TokenError::InvalidRoleType
            | TokenError::EmptyRoles => ErrorKind::ClaimMalformed,
            TokenError::InvalidTokenType => ErrorKind::TypeMismatch,
            TokenError::InvalidIssuer | TokenError::InvalidAudience => ErrorKind::IssuerMismatch,
            TokenError::IssuedInFuture => ErrorKind::IssuedInFuture,
            TokenError::TokenNotYetValid => ErrorKind::NotYetValid,
            TokenError::TokenExpired => ErrorKind::Expired,
            TokenError::MaxLifetimeExceeded => ErrorKind::LifetimeExceeded,
            TokenError::TokenRevoked => ErrorKind::Revoked,
            TokenError::TokenAlreadyRotated => ErrorKind::AlreadyRotated,
            TokenError::TokenGenerationFailed => ErrorKind::Internal,
        }
    }
}
