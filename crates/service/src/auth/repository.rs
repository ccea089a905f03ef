use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{AuthUser, Credentials, DeviceInfo, Session, VerificationKind, VerificationRecord};
use super::errors::AuthError;

/// User records and their password credentials.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, AuthError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError>;
    /// Creates an active, unverified user; a taken email is `UserAlreadyExists`.
    async fn create_user(&self, email: &str, name: &str, role: &str) -> Result<AuthUser, AuthError>;
    async fn mark_user_verified(&self, id: Uuid) -> Result<bool, AuthError>;

    async fn get_credentials(&self, user_id: Uuid) -> Result<Option<Credentials>, AuthError>;
    async fn upsert_password(&self, user_id: Uuid, password_hash: String, password_algorithm: String) -> Result<Credentials, AuthError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
        device: &DeviceInfo,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError>;
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError>;
    async fn find_session_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, AuthError>;
    /// Active and unexpired, newest first.
    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError>;
    /// `false` when no such session exists.
    async fn deactivate_session(&self, id: Uuid) -> Result<bool, AuthError>;
    async fn deactivate_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait VerificationTokenRepository: Send + Sync {
    async fn create_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        kind: VerificationKind,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationRecord, AuthError>;
    async fn find_verification_token(&self, token_hash: &str, kind: VerificationKind) -> Result<Option<VerificationRecord>, AuthError>;
    /// Flip `is_used` only if it is still false; `true` for exactly one caller.
    async fn mark_verification_token_used(&self, id: Uuid) -> Result<bool, AuthError>;
}

/// Everything the orchestrator persists.
pub trait AuthRepository: UserRepository + SessionRepository + VerificationTokenRepository {}

impl<T> AuthRepository for T where T: UserRepository + SessionRepository + VerificationTokenRepository {}

/// Simple in-memory mock repository for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockAuthRepository {
        users: Mutex<HashMap<Uuid, AuthUser>>,
        creds: Mutex<HashMap<Uuid, Credentials>>, // key: user_id
        sessions: Mutex<HashMap<Uuid, Session>>,
        tokens: Mutex<HashMap<Uuid, VerificationRecord>>,
    }

    impl MockAuthRepository {
        pub fn set_role(&self, id: Uuid, role: &str) {
            if let Some(u) = self.users.lock().unwrap().get_mut(&id) {
                u.role = role.to_string();
            }
        }

        pub fn set_active(&self, id: Uuid, active: bool) {
            if let Some(u) = self.users.lock().unwrap().get_mut(&id) {
                u.is_active = active;
            }
        }

        /// Move a session's expiry, e.g. into the past.
        pub fn set_session_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) {
            if let Some(s) = self.sessions.lock().unwrap().get_mut(&id) {
                s.expires_at = expires_at;
            }
        }

        pub fn session_count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UserRepository for MockAuthRepository {
        async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, AuthError> {
            let email = models::user::normalize_email(email);
            let users = self.users.lock().unwrap();
            Ok(users.values().find(|u| u.email == email).cloned())
        }

        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn create_user(&self, email: &str, name: &str, role: &str) -> Result<AuthUser, AuthError> {
            models::user::validate_email(email)?;
            models::user::validate_name(name)?;
            let email = models::user::normalize_email(email);
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == email) {
                return Err(AuthError::UserAlreadyExists);
            }
            let user = AuthUser {
                id: Uuid::new_v4(),
                email,
                name: name.trim().to_string(),
                role: role.to_string(),
                is_active: true,
                is_verified: false,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn mark_user_verified(&self, id: Uuid) -> Result<bool, AuthError> {
            let mut users = self.users.lock().unwrap();
            Ok(users.get_mut(&id).map(|u| u.is_verified = true).is_some())
        }

        async fn get_credentials(&self, user_id: Uuid) -> Result<Option<Credentials>, AuthError> {
            let creds = self.creds.lock().unwrap();
            Ok(creds.get(&user_id).cloned())
        }

        async fn upsert_password(&self, user_id: Uuid, password_hash: String, password_algorithm: String) -> Result<Credentials, AuthError> {
            let mut creds = self.creds.lock().unwrap();
            let c = Credentials { user_id, password_hash, password_algorithm };
            creds.insert(user_id, c.clone());
            Ok(c)
        }
    }

    #[async_trait]
    impl SessionRepository for MockAuthRepository {
        async fn create_session(
            &self,
            user_id: Uuid,
            refresh_token_hash: &str,
            device: &DeviceInfo,
            expires_at: DateTime<Utc>,
        ) -> Result<Session, AuthError> {
            let now = Utc::now();
            let s = Session {
                id: Uuid::new_v4(),
                user_id,
                refresh_token_hash: refresh_token_hash.to_string(),
                user_agent: device.user_agent.clone(),
                ip_address: device.ip_address.clone(),
                is_active: true,
                expires_at,
                created_at: now,
                updated_at: now,
            };
            self.sessions.lock().unwrap().insert(s.id, s.clone());
            Ok(s)
        }

        async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
            Ok(self.sessions.lock().unwrap().get(&id).cloned())
        }

        async fn find_session_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, AuthError> {
            let sessions = self.sessions.lock().unwrap();
            Ok(sessions.values().find(|s| s.refresh_token_hash == refresh_token_hash).cloned())
        }

        async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
            let now = Utc::now();
            let sessions = self.sessions.lock().unwrap();
            let mut active: Vec<Session> = sessions
                .values()
                .filter(|s| s.user_id == user_id && s.is_active && !s.is_expired_at(now))
                .cloned()
                .collect();
            active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(active)
        }

        async fn deactivate_session(&self, id: Uuid) -> Result<bool, AuthError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(&id) {
                Some(s) => {
                    s.is_active = false;
                    s.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn deactivate_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthError> {
            let mut sessions = self.sessions.lock().unwrap();
            let mut n = 0;
            for s in sessions.values_mut().filter(|s| s.user_id == user_id && s.is_active) {
                s.is_active = false;
                s.updated_at = Utc::now();
                n += 1;
            }
            Ok(n)
        }
    }

    #[async_trait]
    impl VerificationTokenRepository for MockAuthRepository {
        async fn create_verification_token(
            &self,
            user_id: Uuid,
            token_hash: &str,
            kind: VerificationKind,
            expires_at: DateTime<Utc>,
        ) -> Result<VerificationRecord, AuthError> {
            let rec = VerificationRecord {
                id: Uuid::new_v4(),
                user_id,
                token_hash: token_hash.to_string(),
                kind,
                expires_at,
                is_used: false,
                created_at: Utc::now(),
            };
            self.tokens.lock().unwrap().insert(rec.id, rec.clone());
            Ok(rec)
        }

        async fn find_verification_token(&self, token_hash: &str, kind: VerificationKind) -> Result<Option<VerificationRecord>, AuthError> {
            let tokens = self.tokens.lock().unwrap();
            Ok(tokens.values().find(|t| t.token_hash == token_hash && t.kind == kind).cloned())
        }

        async fn mark_verification_token_used(&self, id: Uuid) -> Result<bool, AuthError> {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(&id) {
                Some(t) if !t.is_used => {
                    t.is_used = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
