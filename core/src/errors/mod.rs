//! Domain-specific error types and error handling.

mod types;


pub use types::{ErrorKind, StoreError, TokenError, ValidationError};

use thiserror::Error;

/// Engine features that can be switched off by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Revocation,
    Rotation,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Revocation => write!(f, "revocation"),
            Feature::Rotation => write!(f, "rotation"),
        }
    }
}

/// Core domain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{feature} is not enabled")]
    FeatureDisabled { feature: Feature },

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { message } => DomainError::StoreUnavailable { message },
            StoreError::Unsupported { operation } => DomainError::Internal {
                message: format!("store does not support {}", operation),
            },
        }
    }
}

impl DomainError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Token(err) => err.kind(),
            DomainError::Validation(_) => ErrorKind::InvalidInput,
            DomainError::FeatureDisabled { .. } => ErrorKind::FeatureDisabled,
            DomainError::Canceled | DomainError::DeadlineExceeded => ErrorKind::CanceledOrTimedOut,
            DomainError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            DomainError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry: the outcome was undetermined, not "bad token"
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreUnavailable | ErrorKind::CanceledOrTimedOut
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
