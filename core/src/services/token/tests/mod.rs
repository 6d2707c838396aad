//! Shared fixtures for token service tests

mod rotation_tests;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::repositories::MemoryTokenStore;
use crate::services::token::{TokenService, TokenServiceConfig};

pub(crate) const TEST_SECRET: &str = "unit-test-secret-with-enough-entropy";

pub(crate) fn test_config() -> TokenServiceConfig {
    TokenServiceConfig::new(TEST_SECRET)
}

/// Service with revocation and rotation backed by one memory store
pub(crate) fn service_with_store() -> (TokenService, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    let service = TokenService::new(test_config())
        .unwrap()
        .with_store(Arc::clone(&store));
    (service, store)
}

pub(crate) fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Wire claims of a valid access token issued at `now`
pub(crate) fn access_claims_json(now: DateTime<Utc>) -> Value {
    json!({
        "jti": Uuid::new_v4().to_string(),
        "sub": Uuid::new_v4().to_string(),
        "sid": Uuid::new_v4().to_string(),
        "username": "alice",
        "roles": ["user"],
        "iat": now.timestamp(),
        "nbf": now.timestamp(),
        "exp": (now + Duration::minutes(15)).timestamp(),
        "max_exp": (now + Duration::hours(1)).timestamp(),
        "token_type": "access",
        "iss": "tokenkeep",
        "aud": "tokenkeep-api",
    })
}
