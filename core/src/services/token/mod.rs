//! Token service module
//!
//! This module handles all token-related operations including:
//! - Signing and parsing compact JWS tokens
//! - Access and refresh token issuance and verification
//! - Revocation and one-time refresh rotation
//! - HMAC and RSA key management
//! - Background cleanup of expired records

mod cleanup;
mod codec;
mod config;
mod key_manager;
mod rotation;
mod service;

#[cfg(test)]
mod tests;

pub use cleanup::{CleanupResult, TokenCleanupService};
pub use codec::TokenCodec;
pub use config::TokenServiceConfig;
pub use key_manager::{KeyFamily, KeyMaterial};
pub use rotation::RotationController;
pub use service::TokenService;
