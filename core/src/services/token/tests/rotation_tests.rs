//! Unit tests for refresh token rotation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{roles, service_with_store, test_config};
use crate::context::OperationContext;
use crate::errors::{DomainError, ErrorKind, Feature, StoreError, TokenError};
use crate::repositories::{MemoryTokenStore, MockTokenStore, RotationStore};
use crate::services::token::TokenService;

/// Rotation store that cancels the caller's context as soon as a consume lands
struct CancelAfterConsume {
    inner: Arc<MemoryTokenStore>,
    cancellation: CancellationToken,
}

#[async_trait]
impl RotationStore for CancelAfterConsume {
    async fn try_consume(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let won = self.inner.try_consume(token_id, expires_at).await?;
        self.cancellation.cancel();
        Ok(won)
    }

    async fn is_consumed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        self.inner.is_consumed(token_id).await
    }
}

#[tokio::test]
async fn test_rotation_preserves_session_and_ceiling() {
    let (service, _store) = service_with_store();
    let ctx = OperationContext::background();
    let subject = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    let original = service
        .issue_refresh_token(&ctx, subject, "alice", session_id)
        .unwrap();
    let rotated = service.rotate_refresh_token(&ctx, &original.token).await.unwrap();

    assert_ne!(rotated.claims.token_id, original.claims.token_id);
    assert_eq!(rotated.claims.subject, subject);
    assert_eq!(rotated.claims.session_id, session_id);
    assert_eq!(rotated.claims.username, "alice");
    assert_eq!(
        rotated.claims.max_lifetime_expiry,
        original.claims.max_lifetime_expiry
    );

    let claims = service.verify_refresh_token(&ctx, &rotated.token).await.unwrap();
    assert_eq!(claims, rotated.claims);
}

#[tokio::test]
async fn test_old_token_fails_after_rotation() {
    let (service, _store) = service_with_store();
    let ctx = OperationContext::background();

    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();
    service.rotate_refresh_token(&ctx, &original.token).await.unwrap();

    let err = service
        .verify_refresh_token(&ctx, &original.token)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Token(TokenError::TokenRevoked));

    let err = service
        .rotate_refresh_token(&ctx, &original.token)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Revoked | ErrorKind::AlreadyRotated));
}

#[tokio::test]
async fn test_consumed_record_blocks_reuse_without_revocation() {
    let store = Arc::new(MemoryTokenStore::new());
    let service = TokenService::new(test_config().with_revocation(false))
        .unwrap()
        .with_store(Arc::clone(&store));
    let ctx = OperationContext::background();

    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();
    service.rotate_refresh_token(&ctx, &original.token).await.unwrap();

    let err = service
        .verify_refresh_token(&ctx, &original.token)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Token(TokenError::TokenAlreadyRotated));
    assert_eq!(err.to_string(), "token already rotated");
    assert_eq!(store.revoked_count().await, 0);
}

#[tokio::test]
async fn test_rotation_expiry_never_passes_ceiling() {
    let mut config = test_config();
    config.refresh_token_expiry = Duration::days(7);
    config.refresh_max_lifetime = Duration::days(1);
    let store = Arc::new(MemoryTokenStore::new());
    let service = TokenService::new(config).unwrap().with_store(store);
    let ctx = OperationContext::background();

    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();
    let rotated = service.rotate_refresh_token(&ctx, &original.token).await.unwrap();

    assert!(rotated.claims.expires_at <= original.claims.max_lifetime_expiry);
    assert_eq!(rotated.claims.expires_at, rotated.claims.max_lifetime_expiry);
}

#[tokio::test]
async fn test_access_token_cannot_be_rotated() {
    let (service, store) = service_with_store();
    let ctx = OperationContext::background();

    let access = service
        .issue_access_token(&ctx, Uuid::new_v4(), "alice", &roles(&["user"]), Uuid::new_v4())
        .unwrap();

    let err = service.rotate_refresh_token(&ctx, &access.token).await.unwrap_err();
    assert_eq!(err, DomainError::Token(TokenError::InvalidTokenType));
    assert_eq!(store.consumed_count().await, 0);
}

#[tokio::test]
async fn test_rotation_disabled() {
    let ctx = OperationContext::background();

    let service = TokenService::new(test_config()).unwrap();
    let refresh = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();
    let err = service.rotate_refresh_token(&ctx, &refresh.token).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::FeatureDisabled {
            feature: Feature::Rotation
        }
    );
    assert_eq!(err.to_string(), "rotation is not enabled");

    let service = TokenService::new(test_config().with_rotation(false))
        .unwrap()
        .with_store(Arc::new(MemoryTokenStore::new()));
    assert!(!service.rotation_enabled());
    let err = service.rotate_refresh_token(&ctx, &refresh.token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeatureDisabled);
}

#[tokio::test]
async fn test_store_outage_consumes_nothing() {
    let store = Arc::new(MockTokenStore::new());
    let service = TokenService::new(test_config())
        .unwrap()
        .with_store(Arc::clone(&store));
    let ctx = OperationContext::background();

    let refresh = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();

    store.set_unavailable(true);
    let err = service.rotate_refresh_token(&ctx, &refresh.token).await.unwrap_err();
    assert!(err.is_retryable());

    store.set_unavailable(false);
    assert!(!store.is_consumed(refresh.claims.token_id).await.unwrap());
    assert!(service.rotate_refresh_token(&ctx, &refresh.token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_rotation_has_one_winner() {
    let (service, _store) = service_with_store();
    let service = Arc::new(service);
    let ctx = OperationContext::background();

    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let service = Arc::clone(&service);
            let token = original.token.clone();
            tokio::spawn(async move {
                service
                    .rotate_refresh_token(&OperationContext::background(), &token)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(
                matches!(err.kind(), ErrorKind::AlreadyRotated | ErrorKind::Revoked),
                "unexpected error: {}",
                err
            ),
        }
    }

    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_cancellation_after_consume_still_returns_new_token() {
    let store = Arc::new(MemoryTokenStore::new());
    let cancellation = CancellationToken::new();
    let service = TokenService::new(test_config())
        .unwrap()
        .with_revocation_store(store.clone())
        .with_rotation_store(Arc::new(CancelAfterConsume {
            inner: Arc::clone(&store),
            cancellation: cancellation.clone(),
        }));
    let ctx = OperationContext::from_token(cancellation);

    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();
    let rotated = service.rotate_refresh_token(&ctx, &original.token).await.unwrap();
    assert!(ctx.is_canceled());
    assert_eq!(store.consumed_count().await, 1);

    let fresh = OperationContext::background();
    let claims = service.verify_refresh_token(&fresh, &rotated.token).await.unwrap();
    assert_eq!(claims, rotated.claims);

    let err = service
        .verify_refresh_token(&fresh, &original.token)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Token(TokenError::TokenAlreadyRotated));
}

#[tokio::test]
async fn test_canceled_context_consumes_nothing() {
    let (service, store) = service_with_store();
    let ctx = OperationContext::background();
    let original = service
        .issue_refresh_token(&ctx, Uuid::new_v4(), "alice", Uuid::new_v4())
        .unwrap();

    ctx.cancel();
    let err = service.rotate_refresh_token(&ctx, &original.token).await.unwrap_err();
    assert_eq!(err, DomainError::Canceled);
    assert_eq!(store.consumed_count().await, 0);

    let fresh = OperationContext::background();
    assert!(service.rotate_refresh_token(&fresh, &original.token).await.is_ok());
}

#[tokio::test]
async fn test_rotation_refused_past_ceiling_within_skew() {
    let mut config = test_config();
    config.clock_skew = Duration::seconds(60);
    let store = Arc::new(MemoryTokenStore::new());
    let service = TokenService::new(config)
        .unwrap()
        .with_store(Arc::clone(&store));
    let ctx = OperationContext::background();

    let now = Utc::now().trunc_subsecs(0);
    let token_id = Uuid::new_v4();
    let token = service
        .codec()
        .encode(&json!({
            "jti": token_id.to_string(),
            "sub": Uuid::new_v4().to_string(),
            "sid": Uuid::new_v4().to_string(),
            "username": "alice",
            "iat": (now - Duration::hours(1)).timestamp(),
            "nbf": (now - Duration::hours(1)).timestamp(),
            "exp": (now - Duration::seconds(5)).timestamp(),
            "max_exp": (now - Duration::seconds(5)).timestamp(),
            "token_type": "refresh",
            "iss": "tokenkeep",
            "aud": "tokenkeep-api",
        }))
        .unwrap();

    // still inside the skew window, so it verifies
    let claims = service.verify_refresh_token(&ctx, &token).await.unwrap();
    assert_eq!(claims.token_id, token_id);

    let err = service.rotate_refresh_token(&ctx, &token).await.unwrap_err();
    assert_eq!(err, DomainError::Token(TokenError::MaxLifetimeExceeded));
    assert_eq!(store.consumed_count().await, 0);
}
