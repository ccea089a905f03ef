//! Per-device session bookkeeping. Sessions reference their refresh token
//! only through its sha256 hex digest.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::domain::{DeviceInfo, Session};
use super::errors::AuthError;
use super::repository::SessionRepository;

pub struct SessionStore<R: SessionRepository + ?Sized> {
    repo: Arc<R>,
}

impl<R: SessionRepository + ?Sized> Clone for SessionStore<R> {
    fn clone(&self) -> Self {
        Self { repo: self.repo.clone() }
    }
}

fn is_token_hash(s: &str) -> bool {
    s.len() == common::crypto::TOKEN_HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl<R: SessionRepository + ?Sized> SessionStore<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, user_id: Uuid, device: &DeviceInfo, refresh_token_hash: &str, ttl: Duration) -> Result<Session, AuthError> {
        if !is_token_hash(refresh_token_hash) {
            return Err(AuthError::Validation("refresh token reference must be a sha256 hex digest".into()));
        }
        let session = self.repo.create_session(user_id, refresh_token_hash, device, Utc::now() + ttl).await?;
        info!(user_id = %user_id, session_id = %session.id, "session_created");
        Ok(session)
    }

    /// Inactive sessions are returned as-is; expired ones are an error.
    pub async fn get(&self, session_id: Uuid) -> Result<Session, AuthError> {
        let session = self.repo.find_session(session_id).await?.ok_or(AuthError::SessionNotFound)?;
        Self::check_expiry(session)
    }

    pub async fn find_by_refresh_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let hash = common::crypto::hash_token(refresh_token);
        let session = self.repo.find_session_by_refresh_hash(&hash).await?.ok_or(AuthError::SessionNotFound)?;
        Self::check_expiry(session)
    }

    fn check_expiry(session: Session) -> Result<Session, AuthError> {
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        self.repo.list_active_sessions(user_id).await
    }

    /// Idempotent for known sessions.
    pub async fn deactivate(&self, session_id: Uuid) -> Result<(), AuthError> {
        if !self.repo.deactivate_session(session_id).await? {
            return Err(AuthError::SessionNotFound);
        }
        debug!(session_id = %session_id, "session_deactivated");
        Ok(())
    }

    /// Marks every session of the user inactive. Token revocation is the
    /// caller's job (see `AuthService::logout_all`).
    pub async fn deactivate_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let n = self.repo.deactivate_all_sessions(user_id).await?;
        info!(user_id = %user_id, count = n, "sessions_deactivated");
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::mock::MockAuthRepository;
    use crate::auth::repository::UserRepository;
    use common::crypto::{generate_secure_token, hash_token};

    fn device() -> DeviceInfo {
        DeviceInfo { user_agent: Some("Mozilla/5.0".into()), ip_address: Some("203.0.113.7".into()) }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let repo = Arc::new(MockAuthRepository::default());
        let store = SessionStore::new(repo.clone());
        let uid = Uuid::new_v4();
        let raw = generate_secure_token();
        let s = store.create(uid, &device(), &hash_token(&raw), Duration::hours(1)).await.unwrap();
        assert_ne!(s.refresh_token_hash, raw);
        assert_eq!(store.get(s.id).await.unwrap().id, s.id);
        assert_eq!(store.find_by_refresh_token(&raw).await.unwrap().id, s.id);
        assert!(matches!(store.find_by_refresh_token("other").await, Err(AuthError::SessionNotFound)));
        assert!(matches!(store.get(Uuid::new_v4()).await, Err(AuthError::SessionNotFound)));
    }

    #[tokio::test]
    async fn rejects_raw_token_as_reference() {
        let store = SessionStore::new(Arc::new(MockAuthRepository::default()));
        let raw = generate_secure_token();
        assert!(matches!(
            store.create(Uuid::new_v4(), &device(), &raw, Duration::hours(1)).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_is_reported() {
        let repo = Arc::new(MockAuthRepository::default());
        let store = SessionStore::new(repo.clone());
        let s = store.create(Uuid::new_v4(), &device(), &hash_token("r"), Duration::hours(1)).await.unwrap();
        repo.set_session_expiry(s.id, Utc::now() - Duration::seconds(1));
        assert!(matches!(store.get(s.id).await, Err(AuthError::SessionExpired)));
        assert!(matches!(store.find_by_refresh_token("r").await, Err(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let store = SessionStore::new(Arc::new(MockAuthRepository::default()));
        let s = store.create(Uuid::new_v4(), &device(), &hash_token("r"), Duration::hours(1)).await.unwrap();
        store.deactivate(s.id).await.unwrap();
        store.deactivate(s.id).await.unwrap();
        assert!(!store.get(s.id).await.unwrap().is_active);
        assert!(matches!(store.deactivate(Uuid::new_v4()).await, Err(AuthError::SessionNotFound)));
    }

    #[tokio::test]
    async fn list_and_deactivate_all_per_user() {
        let repo = Arc::new(MockAuthRepository::default());
        let store = SessionStore::new(repo.clone());
        let alice = repo.create_user("alice@example.com", "Alice", "user").await.unwrap().id;
        let bob = Uuid::new_v4();
        for i in 0..3 {
            store.create(alice, &device(), &hash_token(&format!("a{i}")), Duration::hours(1)).await.unwrap();
        }
        store.create(bob, &device(), &hash_token("b"), Duration::hours(1)).await.unwrap();
        let expired = store.create(alice, &device(), &hash_token("old"), Duration::hours(1)).await.unwrap();
        repo.set_session_expiry(expired.id, Utc::now() - Duration::minutes(1));

        assert_eq!(store.list_active(alice).await.unwrap().len(), 3);
        assert_eq!(store.deactivate_all(alice).await.unwrap(), 4);
        assert_eq!(store.deactivate_all(alice).await.unwrap(), 0);
        assert!(store.list_active(alice).await.unwrap().is_empty());
        assert_eq!(store.list_active(bob).await.unwrap().len(), 1);
    }
}
