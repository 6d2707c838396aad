//! # TokenKeep Core
//!
//! Token lifecycle engine: issuance, verification, revocation and one-time
//! rotation of access and refresh tokens. This crate contains the claim model,
//! the codec, the store interfaces with an in-memory implementation, the
//! service façade and the error types.

pub mod context;
pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use context::OperationContext;
pub use domain::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
