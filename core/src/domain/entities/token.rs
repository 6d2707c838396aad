//! Token entities: the signed claim set and its validation rules.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TokenError;

/// Maximum username length in characters
pub const MAX_USERNAME_LENGTH: usize = 1000;

/// Kind of token a claim set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    /// Wire representation of the token type
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "access" => Some(TokenType::Access),
            "refresh" => Some(TokenType::Refresh),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by a signed token
///
/// Immutable once issued. Whenever a claim must change a new claim set with a
/// fresh `token_id` is minted instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID, the revocation and rotation key
    #[serde(rename = "jti")]
    pub token_id: Uuid,

    /// Owning principal
    #[serde(rename = "sub")]
    pub subject: Uuid,

    /// Login session the token belongs to
    #[serde(rename = "sid")]
    pub session_id: Uuid,

    /// Opaque display name
    pub username: String,

    /// Granted roles; empty for refresh tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Issued at
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Not before
    #[serde(rename = "nbf", with = "chrono::serde::ts_seconds")]
    pub not_before: DateTime<Utc>,

    /// Expiration
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Absolute ceiling of the session, carried unchanged through rotation
    #[serde(rename = "max_exp", with = "chrono::serde::ts_seconds")]
    pub max_lifetime_expiry: DateTime<Utc>,

    pub token_type: TokenType,

    /// Issuer
    #[serde(rename = "iss")]
    pub issuer: String,

    /// Audience
    #[serde(rename = "aud")]
    pub audience: String,
}

impl Claims {
    /// Instant after which the token can no longer verify, whichever of the
    /// expiry and the lifetime ceiling comes first
    pub fn natural_expiry(&self) -> DateTime<Utc> {
        self.expires_at.min(self.max_lifetime_expiry)
    }

    /// Seconds until `expires_at`, zero once passed
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Checks if the claims have expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Claim set exactly as decoded from the wire, before any rule is applied
///
/// Every field is optional so that a missing claim surfaces as
/// [`TokenError::MissingClaim`] rather than an opaque decoding failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClaims {
    pub jti: Option<String>,
    pub sub: Option<String>,
    pub sid: Option<String>,
    pub username: Option<String>,
    pub roles: Option<Vec<serde_json::Value>>,
    pub iat: Option<i64>,
    pub nbf: Option<i64>,
    pub exp: Option<i64>,
    pub max_exp: Option<i64>,
    pub token_type: Option<String>,
    pub iss: Option<String>,
    pub aud: Option<String>,
}

/// Parameters of a single validation run
#[derive(Debug, Clone)]
pub struct ValidationRules<'a> {
    /// Token type demanded by the verification method
    pub expected_type: TokenType,
    /// Required `iss`
    pub issuer: &'a str,
    /// Required `aud`
    pub audience: &'a str,
    /// Tolerated clock skew
    pub leeway: Duration,
}

impl RawClaims {
    /// Promote the raw claims to a trusted [`Claims`], applying every rule in
    /// order. The first violation wins.
    pub fn validate(
        self,
        rules: &ValidationRules<'_>,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let claims = self.validate_structure(rules)?;
        claims.check_validity_window(rules.leeway, now)?;
        Ok(claims)
    }

    /// Apply the presence, format, type, role and issuer rules, leaving out
    /// the validity window. Used where an expired token is still acceptable.
    pub fn validate_structure(self, rules: &ValidationRules<'_>) -> Result<Claims, TokenError> {
        // 1. presence
        let jti = require(self.jti, "jti")?;
        let sub = require(self.sub, "sub")?;
        let sid = require(self.sid, "sid")?;
        let username = require(self.username, "username")?;
        // roles are mandatory for tokens that declare themselves access tokens
        let declared_access = self.token_type.as_deref() == Some(TokenType::Access.as_str());
        let roles = match self.roles {
            Some(roles) => Some(roles),
            None if declared_access => return Err(TokenError::MissingClaim { claim: "roles" }),
            None => None,
        };
        let iat = require(self.iat, "iat")?;
        let nbf = require(self.nbf, "nbf")?;
        let exp = require(self.exp, "exp")?;
        let max_exp = require(self.max_exp, "max_exp")?;
        let token_type = require(self.token_type, "token_type")?;
        let iss = require(self.iss, "iss")?;
        let aud = require(self.aud, "aud")?;

        // 2. well-formed identifiers and values
        let token_id = parse_uuid(&jti, "jti")?;
        let subject = parse_uuid(&sub, "sub")?;
        if subject.is_nil() {
            return Err(TokenError::InvalidClaim { claim: "sub" });
        }
        let session_id = parse_uuid(&sid, "sid")?;
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(TokenError::InvalidClaim { claim: "username" });
        }
        let issued_at = parse_timestamp(iat, "iat")?;
        let not_before = parse_timestamp(nbf, "nbf")?;
        let expires_at = parse_timestamp(exp, "exp")?;
        let max_lifetime_expiry = parse_timestamp(max_exp, "max_exp")?;

        // 3. token type
        let token_type = TokenType::parse(&token_type).ok_or(TokenError::InvalidTokenType)?;
        if token_type != rules.expected_type {
            return Err(TokenError::InvalidTokenType);
        }

        // 4. roles
        let roles = match roles {
            Some(values) => validate_roles(values)?,
            None => Vec::new(),
        };

        // 4a. issuer and audience
        if iss != rules.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if aud != rules.audience {
            return Err(TokenError::InvalidAudience);
        }

        Ok(Claims {
            token_id,
            subject,
            session_id,
            username,
            roles,
            issued_at,
            not_before,
            expires_at,
            max_lifetime_expiry,
            token_type,
            issuer: iss,
            audience: aud,
        })
    }
}

impl Claims {
    /// Check `iat`, `nbf`, `exp` and `max_exp` against `now`, tolerating `leeway`
    pub fn check_validity_window(
        &self,
        leeway: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        if self.issued_at > now + leeway {
            return Err(TokenError::IssuedInFuture);
        }
        if now + leeway < self.not_before {
            return Err(TokenError::TokenNotYetValid);
        }
        if now - leeway >= self.expires_at {
            return Err(TokenError::TokenExpired);
        }
        if now - leeway >= self.max_lifetime_expiry {
            return Err(TokenError::MaxLifetimeExceeded);
        }
        Ok(())
    }
}

fn require<T>(value: Option<T>, claim: &'static str) -> Result<T, TokenError> {
    value.ok_or(TokenError::MissingClaim { claim })
}

fn parse_uuid(raw: &str, claim: &'static str) -> Result<Uuid, TokenError> {
    Uuid::parse_str(raw).map_err(|_| TokenError::InvalidClaim { claim })
}

fn parse_timestamp(secs: i64, claim: &'static str) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(TokenError::InvalidClaim { claim })
}

fn validate_roles(values: Vec<serde_json::Value>) -> Result<Vec<String>, TokenError> {
    let mut roles = Vec::with_capacity(values.len());
    for value in values {
        match value {
            serde_json::Value::String(role) if role.is_empty() => {
                return Err(TokenError::InvalidClaim { claim: "roles" });
            }
            serde_json::Value::String(role) => roles.push(role),
            _ => return Err(TokenError::InvalidRoleType),
        }
    }
    if roles.is_empty() {
        return Err(TokenError::EmptyRoles);
    }
    Ok(roles)
}

/// A freshly minted token together with the claims it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Signed, transportable token string
    pub token: String,
    /// Claims embedded in `token`
    pub claims: Claims,
    /// Seconds until the token expires
    pub expires_in: i64,
}

/// Token pair returned to the client at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,

    /// Signed refresh token
    pub refresh_token: String,

    /// Access token expiry time in seconds
    pub access_expires_in: i64,

    /// Refresh token expiry time in seconds
    pub refresh_expires_in: i64,

    /// Session both tokens belong to
    pub session_id: Uuid,
}

impl TokenPair {
    /// Build a pair from two issued tokens of the same session
    pub fn new(access: IssuedToken, refresh: IssuedToken) -> Self {
        Self {
            session_id: access.claims.session_id,
            access_expires_in: access.expires_in,
            refresh_expires_in: refresh.expires_in,
            access_token: access.token,
            refresh_token: refresh.token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use serde_json::json;

    const ISSUER: &str = "tokenkeep";
    const AUDIENCE: &str = "tokenkeep-api";

    fn rules(expected_type: TokenType) -> ValidationRules<'static> {
        ValidationRules {
            expected_type,
            issuer: ISSUER,
            audience: AUDIENCE,
            leeway: Duration::zero(),
        }
    }

    fn raw_access(now: DateTime<Utc>) -> RawClaims {
        RawClaims {
            jti: Some(Uuid::new_v4().to_string()),
            sub: Some(Uuid::new_v4().to_string()),
            sid: Some(Uuid::new_v4().to_string()),
            username: Some("alice".to_string()),
            roles: Some(vec![json!("user")]),
            iat: Some(now.timestamp()),
            nbf: Some(now.timestamp()),
            exp: Some((now + Duration::minutes(15)).timestamp()),
            max_exp: Some((now + Duration::hours(1)).timestamp()),
            token_type: Some("access".to_string()),
            iss: Some(ISSUER.to_string()),
            aud: Some(AUDIENCE.to_string()),
        }
    }

    #[test]
    fn test_valid_access_claims() {
        let now = Utc::now().trunc_subsecs(0);
        let raw = raw_access(now);
        let subject = raw.sub.clone().unwrap();

        let claims = raw.validate(&rules(TokenType::Access), now).unwrap();

        assert_eq!(claims.subject.to_string(), subject);
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.issued_at, now);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_missing_claims_are_named() {
        let now = Utc::now();
        let claims = [
            "jti", "sub", "sid", "username", "roles", "iat", "max_exp", "token_type", "aud",
        ];

        for claim in claims {
            let mut raw = raw_access(now);
            match claim {
                "jti" => raw.jti = None,
                "sub" => raw.sub = None,
                "sid" => raw.sid = None,
                "username" => raw.username = None,
                "roles" => raw.roles = None,
                "iat" => raw.iat = None,
                "max_exp" => raw.max_exp = None,
                "token_type" => raw.token_type = None,
                _ => raw.aud = None,
            }
            let err = raw.validate(&rules(TokenType::Access), now).unwrap_err();
            assert_eq!(err, TokenError::MissingClaim { claim }, "claim {}", claim);
            assert_eq!(err.to_string(), format!("missing required claim: {}", claim));
        }
    }

    #[test]
    fn test_first_violation_wins() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.sub = Some("not-a-uuid".to_string());
        raw.token_type = Some("refresh".to_string());
        raw.exp = Some((now - Duration::hours(1)).timestamp());

        let err = raw.validate(&rules(TokenType::Access), now).unwrap_err();
        assert_eq!(err, TokenError::InvalidClaim { claim: "sub" });
    }

    #[test]
    fn test_token_type_mismatch() {
        let now = Utc::now();
        let err = raw_access(now)
            .validate(&rules(TokenType::Refresh), now)
            .unwrap_err();
        assert_eq!(err, TokenError::InvalidTokenType);

        let mut raw = raw_access(now);
        raw.token_type = Some("id".to_string());
        let err = raw.validate(&rules(TokenType::Access), now).unwrap_err();
        assert_eq!(err, TokenError::InvalidTokenType);
    }

    #[test]
    fn test_role_rules() {
        let now = Utc::now();

        let mut raw = raw_access(now);
        raw.roles = Some(vec![json!("user"), json!(42)]);
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidRoleType
        );

        let mut raw = raw_access(now);
        raw.roles = Some(vec![]);
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::EmptyRoles
        );

        let mut raw = raw_access(now);
        raw.roles = Some(vec![json!("")]);
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidClaim { claim: "roles" }
        );
    }

    #[test]
    fn test_refresh_claims_do_not_require_roles() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.roles = None;
        raw.token_type = Some("refresh".to_string());

        let claims = raw.validate(&rules(TokenType::Refresh), now).unwrap();
        assert!(claims.roles.is_empty());
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_refresh_claims_verified_as_access_fail_on_type() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.roles = None;
        raw.token_type = Some("refresh".to_string());

        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidTokenType
        );
    }

    #[test]
    fn test_access_claims_without_roles_are_missing_claim() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.roles = None;

        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::MissingClaim { claim: "roles" }
        );
        let mut raw = raw_access(now);
        raw.roles = None;
        assert_eq!(
            raw.validate(&rules(TokenType::Refresh), now).unwrap_err(),
            TokenError::MissingClaim { claim: "roles" }
        );
    }

    #[test]
    fn test_issuer_and_audience_enforced() {
        let now = Utc::now();

        let mut raw = raw_access(now);
        raw.iss = Some("someone-else".to_string());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidIssuer
        );

        let mut raw = raw_access(now);
        raw.aud = Some("other-api".to_string());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidAudience
        );
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();

        let mut raw = raw_access(now);
        raw.iat = Some((now + Duration::minutes(5)).timestamp());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::IssuedInFuture
        );

        let mut raw = raw_access(now);
        raw.nbf = Some((now + Duration::minutes(5)).timestamp());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::TokenNotYetValid
        );

        let mut raw = raw_access(now);
        raw.iat = Some((now - Duration::hours(2)).timestamp());
        raw.nbf = raw.iat;
        raw.exp = Some((now - Duration::minutes(1)).timestamp());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::TokenExpired
        );

        let mut raw = raw_access(now);
        raw.max_exp = Some((now - Duration::seconds(1)).timestamp());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::MaxLifetimeExceeded
        );
    }

    #[test]
    fn test_structure_check_ignores_validity_window() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.exp = Some((now - Duration::hours(2)).timestamp());
        raw.max_exp = raw.exp;

        let claims = raw.clone().validate_structure(&rules(TokenType::Access)).unwrap();
        assert_eq!(
            claims.check_validity_window(Duration::zero(), now).unwrap_err(),
            TokenError::TokenExpired
        );

        raw.token_type = Some("refresh".to_string());
        assert_eq!(
            raw.validate_structure(&rules(TokenType::Access)).unwrap_err(),
            TokenError::InvalidTokenType
        );
    }

    #[test]
    fn test_leeway_tolerates_small_skew() {
        let now = Utc::now();
        let mut raw = raw_access(now);
        raw.iat = Some((now + Duration::seconds(20)).timestamp());
        raw.nbf = raw.iat;

        let mut lenient = rules(TokenType::Access);
        lenient.leeway = Duration::seconds(30);

        assert!(raw.clone().validate(&lenient, now).is_ok());
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::IssuedInFuture
        );
    }

    #[test]
    fn test_username_is_opaque_but_bounded() {
        let now = Utc::now();

        let mut raw = raw_access(now);
        raw.username = Some("<script>alert('x')</script>\u{0007}ñ".to_string());
        assert!(raw.validate(&rules(TokenType::Access), now).is_ok());

        let mut raw = raw_access(now);
        raw.username = Some("é".repeat(MAX_USERNAME_LENGTH));
        assert!(raw.validate(&rules(TokenType::Access), now).is_ok());

        let mut raw = raw_access(now);
        raw.username = Some("a".repeat(MAX_USERNAME_LENGTH + 1));
        assert_eq!(
            raw.validate(&rules(TokenType::Access), now).unwrap_err(),
            TokenError::InvalidClaim { claim: "username" }
        );
    }

    #[test]
    fn test_claims_wire_names() {
        let now = Utc::now().trunc_subsecs(0);
        let claims = raw_access(now)
            .validate(&rules(TokenType::Access), now)
            .unwrap();

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["jti"], json!(claims.token_id.to_string()));
        assert_eq!(value["iat"], json!(now.timestamp()));
        assert_eq!(value["token_type"], json!("access"));
        assert_eq!(value["roles"], json!(["user"]));

        // The wire form is accepted back by the raw decoder.
        let raw: RawClaims = serde_json::from_value(value).unwrap();
        assert_eq!(raw.validate(&rules(TokenType::Access), now).unwrap(), claims);
    }

    #[test]
    fn test_natural_expiry_is_earliest_bound() {
        let now = Utc::now().trunc_subsecs(0);
        let mut raw = raw_access(now);
        raw.exp = Some((now + Duration::hours(2)).timestamp());
        let claims = raw.validate(&rules(TokenType::Access), now).unwrap();

        assert_eq!(claims.natural_expiry(), claims.max_lifetime_expiry);
        assert_eq!(claims.expires_in(now), 7200);
    }
}
