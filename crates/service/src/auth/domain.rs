use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::TokenPair;

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Login input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Domain user (business view)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
}

/// Domain credentials (hashed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: Uuid,
    pub password_hash: String,
    pub password_algorithm: String,
}

/// Where a login came from; both fields are best effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// One logged-in device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// sha256 hex of the refresh token
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Purpose a verification token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    EmailVerification,
    PasswordReset,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::EmailVerification => models::verification_token::TYPE_EMAIL_VERIFICATION,
            VerificationKind::PasswordReset => models::verification_token::TYPE_PASSWORD_RESET,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            models::verification_token::TYPE_EMAIL_VERIFICATION => Some(VerificationKind::EmailVerification),
            models::verification_token::TYPE_PASSWORD_RESET => Some(VerificationKind::PasswordReset),
            _ => None,
        }
    }
}

/// Persisted verification token; only the hash of the raw value is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub kind: VerificationKind,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

/// Login/registration result
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: AuthUser,
    pub tokens: TokenPair,
    pub session_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serialization_hides_refresh_hash() {
        let now = Utc::now();
        let s = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refresh_token_hash: "a".repeat(64),
            user_agent: Some("curl/8".into()),
            ip_address: None,
            is_active: true,
            expires_at: now,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("refresh_token_hash").is_none());
        assert_eq!(json["user_agent"], "curl/8");
    }

    #[test]
    fn verification_kind_names_match_storage() {
        for kind in [VerificationKind::EmailVerification, VerificationKind::PasswordReset] {
            assert_eq!(VerificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(VerificationKind::parse("magic_link"), None);
    }
}
