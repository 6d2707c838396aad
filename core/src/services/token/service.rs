//! Main token service implementation

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::OperationContext;
use crate::domain::entities::token::{
    Claims, IssuedToken, TokenPair, TokenType, ValidationRules, MAX_USERNAME_LENGTH,
};
use crate::errors::{DomainError, Feature, TokenError, ValidationError};
use crate::repositories::{RevocationStore, RotationStore};

use super::cleanup::TokenCleanupService;
use super::codec::TokenCodec;
use super::config::TokenServiceConfig;
use super::key_manager::KeyMaterial;
use super::rotation::RotationController;

/// Issues, verifies, revokes and rotates access and refresh tokens
///
/// The service holds no per-call state and is meant to be shared behind an
/// `Arc`. Revocation and rotation are active only when enabled in the
/// configuration *and* backed by a store.
pub struct TokenService {
    codec: TokenCodec,
    config: TokenServiceConfig,
    revocation: Option<Arc<dyn RevocationStore>>,
    rotation: Option<RotationController>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.codec.algorithm())
            .field("revocation", &self.revocation_enabled())
            .field("rotation", &self.rotation_enabled())
            .finish()
    }
}

impl TokenService {
    /// Creates a new token service, loading keys as configured
    ///
    /// # Returns
    ///
    /// A new `TokenService` without stores, or an error if the configuration
    /// is inconsistent or key loading fails
    pub fn new(config: TokenServiceConfig) -> Result<Self, DomainError> {
        config.validate()?;
        let keys = config.load_keys()?;
        Self::with_keys(config, keys)
    }

    /// Creates a new token service with explicit key material
    pub fn with_keys(config: TokenServiceConfig, keys: KeyMaterial) -> Result<Self, DomainError> {
        config.validate()?;
        let codec = TokenCodec::new(keys, config.algorithm, config.allowed_algorithms.clone())?;

        Ok(Self {
            codec,
            config,
            revocation: None,
            rotation: None,
        })
    }

    /// Attach the store backing revocation
    pub fn with_revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        if !self.config.revocation_enabled {
            debug!("Revocation store attached while revocation is disabled");
        }
        self.revocation = Some(store);
        self
    }

    /// Attach the store backing rotation
    pub fn with_rotation_store(mut self, store: Arc<dyn RotationStore>) -> Self {
        if !self.config.rotation_enabled {
            debug!("Rotation store attached while rotation is disabled");
        }
        self.rotation = Some(RotationController::new(store));
        self
    }

    /// Attach one store serving both revocation and rotation
    pub fn with_store<S>(self, store: Arc<S>) -> Self
    where
        S: RevocationStore + RotationStore + 'static,
    {
        let revocation: Arc<dyn RevocationStore> = store.clone();
        let rotation: Arc<dyn RotationStore> = store;
        self.with_revocation_store(revocation)
            .with_rotation_store(rotation)
    }

    pub fn config(&self) -> &TokenServiceConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Whether revocation is both enabled and backed by a store
    pub fn revocation_enabled(&self) -> bool {
        self.config.revocation_enabled && self.revocation.is_some()
    }

    /// Whether rotation is both enabled and backed by a store
    pub fn rotation_enabled(&self) -> bool {
        self.config.rotation_enabled && self.rotation.is_some()
    }

    /// Issues a signed access token
    ///
    /// # Arguments
    ///
    /// * `ctx` - Cancellation and deadline for the call
    /// * `subject` - Owning principal, must not be nil
    /// * `username` - Display name, at most 1000 characters
    /// * `roles` - Granted roles, at least one, none empty
    /// * `session_id` - Login session, must not be nil
    ///
    /// # Returns
    ///
    /// * `Ok(IssuedToken)` - The token with its claims
    /// * `Err(DomainError)` - Invalid input, or the context is done
    pub fn issue_access_token(
        &self,
        ctx: &OperationContext,
        subject: Uuid,
        username: &str,
        roles: &[String],
        session_id: Uuid,
    ) -> Result<IssuedToken, DomainError> {
        validate_identity(subject, username, session_id)?;
        validate_roles(roles)?;

        let now = Utc::now().trunc_subsecs(0);
        let max_lifetime_expiry = offset(now, self.config.access_max_lifetime)?;
        let claims = self.mint_claims(
            TokenType::Access,
            subject,
            session_id,
            username,
            roles.to_vec(),
            now,
            max_lifetime_expiry,
        )?;

        let issued = self.sign(ctx, claims, now)?;
        info!(
            token_id = %issued.claims.token_id,
            subject = %subject,
            session_id = %session_id,
            "Issued access token"
        );
        Ok(issued)
    }

    /// Issues a signed refresh token; refresh tokens carry no roles
    pub fn issue_refresh_token(
        &self,
        ctx: &OperationContext,
        subject: Uuid,
        username: &str,
        session_id: Uuid,
    ) -> Result<IssuedToken, DomainError> {
        validate_identity(subject, username, session_id)?;

        let now = Utc::now().trunc_subsecs(0);
        let max_lifetime_expiry = offset(now, self.config.refresh_max_lifetime)?;
        let claims = self.mint_claims(
            TokenType::Refresh,
            subject,
            session_id,
            username,
            Vec::new(),
            now,
            max_lifetime_expiry,
        )?;

        let issued = self.sign(ctx, claims, now)?;
        info!(
            token_id = %issued.claims.token_id,
            subject = %subject,
            session_id = %session_id,
            "Issued refresh token"
        );
        Ok(issued)
    }

    /// Issues an access and a refresh token for a new session
    pub fn issue_token_pair(
        &self,
        ctx: &OperationContext,
        subject: Uuid,
        username: &str,
        roles: &[String],
    ) -> Result<TokenPair, DomainError> {
        let session_id = Uuid::new_v4();
        let access = self.issue_access_token(ctx, subject, username, roles, session_id)?;
        let refresh = self.issue_refresh_token(ctx, subject, username, session_id)?;
        Ok(TokenPair::new(access, refresh))
    }

    /// Verifies an access token and returns its claims
    ///
    /// # Returns
    ///
    /// * `Ok(Claims)` - Authentic, currently valid and not revoked
    /// * `Err(DomainError)` - The first failed check, a store failure, or a
    ///   canceled/expired context
    pub async fn verify_access_token(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<Claims, DomainError> {
        let claims = self.authenticate(token, TokenType::Access)?;
        self.ensure_not_revoked(ctx, &claims).await?;
        Ok(claims)
    }

    /// Verifies a refresh token and returns its claims
    ///
    /// Besides the access-token checks, a refresh token already consumed by a
    /// rotation fails with [`TokenError::TokenAlreadyRotated`].
    pub async fn verify_refresh_token(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<Claims, DomainError> {
        let claims = self.authenticate(token, TokenType::Refresh)?;
        self.ensure_not_revoked(ctx, &claims).await?;

        if let Some(rotation) = self.active_rotation() {
            rotation.ensure_not_consumed(ctx, claims.token_id).await?;
        }
        Ok(claims)
    }

    /// Revokes an access token
    ///
    /// The token must be authentic and of the access type but may already be
    /// expired. Revoking twice is not an error.
    pub async fn revoke_access_token(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<(), DomainError> {
        self.revoke(ctx, token, TokenType::Access).await
    }

    /// Revokes a refresh token
    pub async fn revoke_refresh_token(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<(), DomainError> {
        self.revoke(ctx, token, TokenType::Refresh).await
    }

    /// Exchanges a refresh token for a new one, exactly once
    ///
    /// The new token keeps the subject, session, username and lifetime
    /// ceiling of the old one. Of concurrent rotations of the same token only
    /// one succeeds; the others fail with [`TokenError::TokenAlreadyRotated`].
    ///
    /// The replacement is signed before the old token is consumed, so once
    /// the consume succeeds the call cannot fail and strand the session.
    /// A token already past its lifetime ceiling is never rotated, even
    /// while clock skew still lets it verify.
    ///
    /// # Returns
    ///
    /// * `Ok(IssuedToken)` - The replacement refresh token
    /// * `Err(DomainError)` - Verification failed, the token was already
    ///   rotated, rotation is disabled, or the context is done
    pub async fn rotate_refresh_token(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<IssuedToken, DomainError> {
        let Some(rotation) = self.active_rotation() else {
            self.warn_missing_store(self.config.rotation_enabled, Feature::Rotation);
            return Err(DomainError::FeatureDisabled {
                feature: Feature::Rotation,
            });
        };

        let old = self.verify_refresh_token(ctx, token).await?;

        let now = Utc::now().trunc_subsecs(0);
        if now >= old.max_lifetime_expiry {
            debug!(token_id = %old.token_id, "Refusing to rotate past the lifetime ceiling");
            return Err(TokenError::MaxLifetimeExceeded.into());
        }
        let claims = self.mint_claims(
            TokenType::Refresh,
            old.subject,
            old.session_id,
            &old.username,
            Vec::new(),
            now,
            old.max_lifetime_expiry,
        )?;
        let issued = self.sign(ctx, claims, now)?;

        let retain_until = self.config.retention_until(old.natural_expiry());
        rotation.consume(ctx, old.token_id, retain_until).await?;

        if let Some(store) = self.active_revocation() {
            // The consumed record already blocks reuse; a failed or canceled
            // revoke only changes which error the old token reports.
            if let Err(e) = ctx.run(store.revoke(old.token_id, retain_until)).await {
                warn!(token_id = %old.token_id, error = %e, "Failed to revoke rotated refresh token");
            }
        }

        info!(
            old_token_id = %old.token_id,
            token_id = %issued.claims.token_id,
            session_id = %old.session_id,
            "Rotated refresh token"
        );
        Ok(issued)
    }

    /// Cleanup service sweeping the attached stores
    pub fn cleanup_service(&self) -> TokenCleanupService {
        TokenCleanupService::new(
            self.revocation.clone(),
            self.rotation.as_ref().map(|rotation| Arc::clone(rotation.store())),
            self.config.cleanup_interval,
        )
    }

    fn rules(&self, expected_type: TokenType) -> ValidationRules<'_> {
        ValidationRules {
            expected_type,
            issuer: &self.config.issuer,
            audience: &self.config.audience,
            leeway: self.config.clock_skew,
        }
    }

    fn authenticate(&self, token: &str, expected_type: TokenType) -> Result<Claims, DomainError> {
        let raw = self.codec.decode(token).map_err(|e| {
            debug!(error = %e, "Rejected token");
            e
        })?;

        raw.validate(&self.rules(expected_type), Utc::now())
            .map_err(|e| {
                debug!(error = %e, token_type = %expected_type, "Token failed validation");
                DomainError::from(e)
            })
    }

    async fn ensure_not_revoked(
        &self,
        ctx: &OperationContext,
        claims: &Claims,
    ) -> Result<(), DomainError> {
        if let Some(store) = self.active_revocation() {
            if ctx.run(store.is_revoked(claims.token_id)).await? {
                debug!(token_id = %claims.token_id, "Rejected revoked token");
                return Err(TokenError::TokenRevoked.into());
            }
        }
        Ok(())
    }

    async fn revoke(
        &self,
        ctx: &OperationContext,
        token: &str,
        expected_type: TokenType,
    ) -> Result<(), DomainError> {
        let Some(store) = self.active_revocation() else {
            self.warn_missing_store(self.config.revocation_enabled, Feature::Revocation);
            return Err(DomainError::FeatureDisabled {
                feature: Feature::Revocation,
            });
        };

        let claims = self
            .codec
            .decode(token)?
            .validate_structure(&self.rules(expected_type))?;

        let retain_until = self.config.retention_until(claims.natural_expiry());
        ctx.run(store.revoke(claims.token_id, retain_until)).await?;

        info!(
            token_id = %claims.token_id,
            token_type = %expected_type,
            "Revoked token"
        );
        Ok(())
    }

    fn active_revocation(&self) -> Option<&Arc<dyn RevocationStore>> {
        self.revocation
            .as_ref()
            .filter(|_| self.config.revocation_enabled)
    }

    fn active_rotation(&self) -> Option<&RotationController> {
        self.rotation.as_ref().filter(|_| self.config.rotation_enabled)
    }

    fn warn_missing_store(&self, enabled: bool, feature: Feature) {
        if enabled {
            warn!(feature = %feature, "Feature enabled but no store is configured");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn mint_claims(
        &self,
        token_type: TokenType,
        subject: Uuid,
        session_id: Uuid,
        username: &str,
        roles: Vec<String>,
        now: DateTime<Utc>,
        max_lifetime_expiry: DateTime<Utc>,
    ) -> Result<Claims, DomainError> {
        let expiry = match token_type {
            TokenType::Access => self.config.access_token_expiry,
            TokenType::Refresh => self.config.refresh_token_expiry,
        };

        let expires_at = offset(now, expiry)?.min(max_lifetime_expiry);

        Ok(Claims {
            token_id: Uuid::new_v4(),
            subject,
            session_id,
            username: username.to_string(),
            roles,
            issued_at: now,
            not_before: now,
            expires_at,
            max_lifetime_expiry,
            token_type,
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
        })
    }

    fn sign(
        &self,
        ctx: &OperationContext,
        claims: Claims,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, DomainError> {
        ctx.check()?;
        let token = self.codec.encode(&claims)?;
        let expires_in = claims.expires_in(now);

        Ok(IssuedToken {
            token,
            claims,
            expires_in,
        })
    }
}

fn offset(now: DateTime<Utc>, by: chrono::Duration) -> Result<DateTime<Utc>, DomainError> {
    now.checked_add_signed(by).ok_or_else(|| DomainError::Internal {
        message: format!("{}s past {} is out of range", by.num_seconds(), now),
    })
}

fn validate_identity(subject: Uuid, username: &str, session_id: Uuid) -> Result<(), ValidationError> {
    if subject.is_nil() {
        return Err(ValidationError::NilSubject);
    }
    if session_id.is_nil() {
        return Err(ValidationError::NilSession);
    }

    let length = username.chars().count();
    if length > MAX_USERNAME_LENGTH {
        return Err(ValidationError::UsernameTooLong {
            max: MAX_USERNAME_LENGTH,
            actual: length,
        });
    }
    Ok(())
}

fn validate_roles(roles: &[String]) -> Result<(), ValidationError> {
    if roles.is_empty() {
        return Err(ValidationError::EmptyRoles);
    }
    if let Some(index) = roles.iter().position(|role| role.is_empty()) {
        return Err(ValidationError::EmptyRole { index });
    }
    Ok(())
}
