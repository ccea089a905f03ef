//! Signed access/refresh tokens (HS256) and their revocation.
//!
//! Lifecycle: issued, valid until `exp`, then expired; revocation can end it
//! earlier either per token (`token:blacklist:<sha256>`) or per user
//! (`user:blacklist:<id>` holding the revocation instant in microseconds;
//! tokens issued at or before that instant are rejected, later ones are not).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use configs::auth::{AuthSettings, RevocationFailurePolicy};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::errors::AuthError;
use super::repository::UserRepository;
use super::retry::retry_read_once;
use super::revocation::RevocationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds. `role` and `name` are only present on
/// access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub uid: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub typ: TokenKind,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Issue instant in microseconds since the epoch.
    pub iat_us: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Upper bound for each revocation store round-trip.
    pub cache_timeout: StdDuration,
    pub failure_policy: RevocationFailurePolicy,
}

impl TokenConfig {
    pub fn from_settings(s: &AuthSettings) -> Self {
        Self {
            secret: s.jwt_secret.clone(),
            issuer: s.issuer.clone(),
            access_ttl: Duration::seconds(s.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(s.refresh_token_ttl_secs),
            cache_timeout: StdDuration::from_millis(s.cache_timeout_ms),
            failure_policy: s.revocation_failure_policy,
        }
    }
}

pub fn token_blacklist_key(token: &str) -> String {
    format!("token:blacklist:{}", common::crypto::hash_token(token))
}

pub fn user_blacklist_key(user_id: Uuid) -> String {
    format!("user:blacklist:{user_id}")
}

pub struct TokenIssuer {
    cfg: TokenConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    store: Arc<dyn RevocationStore>,
    /// Latest user revocation instant written by this issuer; tokens minted
    /// afterwards get a strictly later `iat_us`.
    last_revocation_us: AtomicI64,
}

impl TokenIssuer {
    pub fn new(cfg: TokenConfig, store: Arc<dyn RevocationStore>) -> Self {
        let encoding = EncodingKey::from_secret(cfg.secret.as_bytes());
        let decoding = DecodingKey::from_secret(cfg.secret.as_bytes());
        Self { cfg, encoding, decoding, store, last_revocation_us: AtomicI64::new(i64::MIN) }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.cfg
    }

    /// Mint an access/refresh pair signed with the same key.
    pub fn generate(&self, user_id: Uuid, email: &str, role: &str, name: &str) -> Result<TokenPair, AuthError> {
        let access = self.issue_access(user_id, email, role, name)?;
        let refresh = self.issue(user_id, email, None, None, TokenKind::Refresh, self.cfg.refresh_ttl)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".into(),
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    pub fn issue_access(&self, user_id: Uuid, email: &str, role: &str, name: &str) -> Result<IssuedToken, AuthError> {
        self.issue(user_id, email, Some(role), Some(name), TokenKind::Access, self.cfg.access_ttl)
    }

    fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        role: Option<&str>,
        name: Option<&str>,
        typ: TokenKind,
        ttl: Duration,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            uid: user_id,
            email: email.to_string(),
            role: role.map(str::to_string),
            name: name.map(str::to_string),
            typ,
            jti: Uuid::new_v4().to_string(),
            iss: self.cfg.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iat_us: now.timestamp_micros().max(self.last_revocation_us.load(Ordering::Acquire).saturating_add(1)),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::infra("sign token", e))?;
        Ok(IssuedToken { token, expires_at })
    }

    fn validation(&self, check_time: bool) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 0;
        v.validate_exp = check_time;
        v.validate_nbf = check_time;
        v.set_issuer(&[self.cfg.issuer.as_str()]);
        v.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        v
    }

    /// Signature, issuer and time checks only.
    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation(true)).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;
        let claims = data.claims;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Full validation of either token kind.
    #[instrument(skip(self, token))]
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_kind(token, None).await
    }

    pub async fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_kind(token, Some(TokenKind::Access)).await
    }

    pub async fn validate_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_kind(token, Some(TokenKind::Refresh)).await
    }

    async fn validate_kind(&self, token: &str, expected: Option<TokenKind>) -> Result<Claims, AuthError> {
        let claims = self.decode_claims(token)?;
        if let Some(kind) = expected {
            if claims.typ != kind {
                debug!(expected = ?kind, actual = ?claims.typ, "token kind mismatch");
                return Err(AuthError::TokenInvalid);
            }
        }
        match self.is_revoked(token, &claims).await {
            Ok(false) => Ok(claims),
            Ok(true) => Err(AuthError::TokenInvalid),
            Err(e) => match self.cfg.failure_policy {
                RevocationFailurePolicy::FailClosed => {
                    error!(error = %e, user_id = %claims.uid, "revocation check failed, denying token");
                    Err(e)
                }
                RevocationFailurePolicy::FailOpen => {
                    warn!(error = %e, user_id = %claims.uid, "revocation check failed, accepting token");
                    Ok(claims)
                }
            },
        }
    }

    async fn is_revoked(&self, token: &str, claims: &Claims) -> Result<bool, AuthError> {
        if self.cache_get(&token_blacklist_key(token)).await?.is_some() {
            return Ok(true);
        }
        match self.cache_get(&user_blacklist_key(claims.uid)).await? {
            None => Ok(false),
            Some(raw) => match raw.parse::<i64>() {
                Ok(revoked_at_us) => Ok(claims.iat_us <= revoked_at_us),
                Err(_) => {
                    warn!(user_id = %claims.uid, value = %raw, "unreadable user revocation entry");
                    Ok(true)
                }
            },
        }
    }

    async fn cache_get(&self, key: &str) -> Result<Option<String>, AuthError> {
        retry_read_once("revocation get", || async {
            tokio::time::timeout(self.cfg.cache_timeout, self.store.get(key))
                .await
                .map_err(|_| AuthError::Infrastructure("revocation store timed out".into()))?
        })
        .await
    }

    async fn cache_put(&self, key: &str, value: &str, ttl: StdDuration) -> Result<(), AuthError> {
        tokio::time::timeout(self.cfg.cache_timeout, self.store.put(key, value, ttl))
            .await
            .map_err(|_| AuthError::Infrastructure("revocation store timed out".into()))?
    }

    /// Mint a new access token from a refresh token, reading the user's
    /// current role and name rather than trusting the refresh claims.
    #[instrument(skip(self, refresh_token, users))]
    pub async fn refresh<U: UserRepository + ?Sized>(&self, refresh_token: &str, users: &U) -> Result<IssuedToken, AuthError> {
        let claims = self.validate_refresh(refresh_token).await?;
        self.access_for_user(claims.uid, users).await
    }

    /// Access token built from the stored user record.
    pub async fn access_for_user<U: UserRepository + ?Sized>(&self, user_id: Uuid, users: &U) -> Result<IssuedToken, AuthError> {
        let user = users.find_user_by_id(user_id).await?.ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        self.sync_revocation_floor(user.id).await?;
        self.issue_access(user.id, &user.email, &user.role, &user.name)
    }

    /// Raise the issue floor to the user's stored revocation instant.
    ///
    /// The entry may have been written by another instance whose clock runs
    /// ahead of ours; without this a token minted here right after that
    /// logout-all could carry an `iat_us` at or before it.
    pub async fn sync_revocation_floor(&self, user_id: Uuid) -> Result<(), AuthError> {
        match self.cache_get(&user_blacklist_key(user_id)).await {
            Ok(Some(raw)) => {
                match raw.parse::<i64>() {
                    Ok(revoked_at_us) => {
                        self.last_revocation_us.fetch_max(revoked_at_us, Ordering::AcqRel);
                    }
                    Err(_) => warn!(user_id = %user_id, value = %raw, "unreadable user revocation entry"),
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => match self.cfg.failure_policy {
                RevocationFailurePolicy::FailClosed => Err(e),
                RevocationFailurePolicy::FailOpen => {
                    warn!(error = %e, user_id = %user_id, "revocation floor not synced");
                    Ok(())
                }
            },
        }
    }

    /// Signature and issuer checks only; expiry and revocation are ignored.
    pub fn inspect(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation(false))
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Blacklist one token for `min(ttl, remaining lifetime)`. Tokens that
    /// already expired are left alone.
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str, ttl: StdDuration) -> Result<(), AuthError> {
        let claims = self.inspect(token)?;
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            debug!(user_id = %claims.uid, "token already expired, not blacklisted");
            return Ok(());
        }
        let ttl = ttl.min(StdDuration::from_secs(remaining as u64));
        self.cache_put(&token_blacklist_key(token), "1", ttl).await?;
        debug!(user_id = %claims.uid, typ = ?claims.typ, ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }

    /// Reject every token issued to `user_id` up to now, for `ttl`.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_user(&self, user_id: Uuid, ttl: StdDuration) -> Result<(), AuthError> {
        let now_us = Utc::now().timestamp_micros();
        self.last_revocation_us.fetch_max(now_us, Ordering::AcqRel);
        self.cache_put(&user_blacklist_key(user_id), &now_us.to_string(), ttl).await
    }
}
