//! `[auth]` section: signing secret, token lifetimes, hashing and password policy.

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Secret used when neither config nor `JWT_SECRET` provide one. Only
/// accepted when `allow_dev_secret` is set.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PasswordAlgorithm {
    #[default]
    Bcrypt,
    Argon2,
}

impl PasswordAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordAlgorithm::Bcrypt => "bcrypt",
            PasswordAlgorithm::Argon2 => "argon2",
        }
    }
}

/// What token validation does when the revocation cache cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevocationFailurePolicy {
    /// Deny the request with an infrastructure failure.
    #[default]
    FailClosed,
    /// Log a warning and treat the token as not revoked.
    FailOpen,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordPolicySettings {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicySettings {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    /// Accept `DEV_JWT_SECRET` for local runs (`AUTH_ALLOW_DEV_SECRET=true`).
    pub allow_dev_secret: bool,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Lockout window for `user:blacklist:<id>`; defaults to the refresh TTL
    /// so every token live at logout-all time stays covered.
    pub user_revocation_ttl_secs: Option<i64>,
    pub verification_token_ttl_secs: i64,
    pub password_reset_token_ttl_secs: i64,
    pub password_algorithm: PasswordAlgorithm,
    /// bcrypt work factor
    pub hash_cost: u32,
    pub cache_timeout_ms: u64,
    pub cache_max_entries: u64,
    pub revocation_failure_policy: RevocationFailurePolicy,
    pub require_verified_email: bool,
    pub logout_other_sessions_on_password_change: bool,
    /// `redis://` URL; when set the revocation store is shared through Redis.
    pub redis_url: Option<String>,
    pub password: PasswordPolicySettings,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            allow_dev_secret: false,
            issuer: "auth-core".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            user_revocation_ttl_secs: None,
            verification_token_ttl_secs: 24 * 3600,
            password_reset_token_ttl_secs: 3600,
            password_algorithm: PasswordAlgorithm::Bcrypt,
            hash_cost: 12,
            cache_timeout_ms: 2000,
            cache_max_entries: 100_000,
            revocation_failure_policy: RevocationFailurePolicy::FailClosed,
            require_verified_email: false,
            logout_other_sessions_on_password_change: true,
            redis_url: None,
            password: PasswordPolicySettings::default(),
        }
    }
}

impl AuthSettings {
    pub fn normalize_from_env(&mut self) {
        if self.jwt_secret.trim().is_empty() {
            self.jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string());
        }
        if let Ok(flag) = std::env::var("AUTH_ALLOW_DEV_SECRET") {
            self.allow_dev_secret = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if self.redis_url.is_none() {
            self.redis_url = std::env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty());
        }
    }

    pub fn user_revocation_ttl(&self) -> i64 {
        self.user_revocation_ttl_secs.unwrap_or(self.refresh_token_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(anyhow!("auth.jwt_secret is empty; set it in config.toml or JWT_SECRET"));
        }
        if self.jwt_secret == DEV_JWT_SECRET && !self.allow_dev_secret {
            return Err(anyhow!(
                "auth.jwt_secret is the built-in development secret; set JWT_SECRET or enable auth.allow_dev_secret"
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err(anyhow!("auth.issuer must not be empty"));
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(anyhow!("auth token TTLs must be positive"));
        }
        if self.access_token_ttl_secs >= self.refresh_token_ttl_secs {
            return Err(anyhow!("auth.access_token_ttl_secs must be shorter than refresh_token_ttl_secs"));
        }
        if self.user_revocation_ttl() <= 0 {
            return Err(anyhow!("auth.user_revocation_ttl_secs must be positive"));
        }
        if self.verification_token_ttl_secs <= 0 || self.password_reset_token_ttl_secs <= 0 {
            return Err(anyhow!("auth verification token TTLs must be positive"));
        }
        if !(4..=31).contains(&self.hash_cost) {
            return Err(anyhow!("auth.hash_cost must be within 4..=31"));
        }
        if self.cache_timeout_ms == 0 {
            return Err(anyhow!("auth.cache_timeout_ms must be positive"));
        }
        if self.password.min_length < 8 {
            return Err(anyhow!("auth.password.min_length must be >= 8"));
        }
        Ok(())
    }
}
