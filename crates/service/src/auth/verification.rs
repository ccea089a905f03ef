//! Single-use, time-bound tokens for email verification and password reset.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::domain::VerificationKind;
use super::errors::AuthError;
use super::repository::VerificationTokenRepository;

pub const DEFAULT_VERIFICATION_TTL_SECS: i64 = 24 * 3600;

pub struct VerificationTokenService<R: VerificationTokenRepository + ?Sized> {
    repo: Arc<R>,
}

impl<R: VerificationTokenRepository + ?Sized> VerificationTokenService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Returns the raw token. Only its hash is stored, so it cannot be
    /// recovered later, only re-issued.
    pub async fn issue(&self, user_id: Uuid, kind: VerificationKind, ttl: Duration) -> Result<String, AuthError> {
        let raw = common::crypto::generate_secure_token();
        let hash = common::crypto::hash_token(&raw);
        let rec = self.repo.create_verification_token(user_id, &hash, kind, Utc::now() + ttl).await?;
        info!(user_id = %user_id, token_id = %rec.id, kind = kind.as_str(), "verification_token_issued");
        Ok(raw)
    }

    pub async fn issue_default(&self, user_id: Uuid, kind: VerificationKind) -> Result<String, AuthError> {
        self.issue(user_id, kind, Duration::seconds(DEFAULT_VERIFICATION_TTL_SECS)).await
    }

    /// Redeem a token at most once. Under concurrent attempts exactly one
    /// caller gets the user id; the rest see `TokenAlreadyUsed`.
    pub async fn consume(&self, raw: &str, kind: VerificationKind) -> Result<Uuid, AuthError> {
        let hash = common::crypto::hash_token(raw);
        let rec = self.repo.find_verification_token(&hash, kind).await?.ok_or(AuthError::TokenNotFound)?;
        if rec.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }
        if rec.is_used {
            return Err(AuthError::TokenAlreadyUsed);
        }
        if !self.repo.mark_verification_token_used(rec.id).await? {
            debug!(token_id = %rec.id, "lost consume race");
            return Err(AuthError::TokenAlreadyUsed);
        }
        info!(user_id = %rec.user_id, token_id = %rec.id, kind = kind.as_str(), "verification_token_consumed");
        Ok(rec.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::mock::MockAuthRepository;
    use crate::auth::repository::{UserRepository, VerificationTokenRepository};
    use crate::test_support::sqlite_repo;

    #[tokio::test]
    async fn issue_then_consume_once() {
        let repo = Arc::new(MockAuthRepository::default());
        let svc = VerificationTokenService::new(repo.clone());
        let uid = Uuid::new_v4();
        let raw = svc.issue_default(uid, VerificationKind::EmailVerification).await.unwrap();
        assert!(repo
            .find_verification_token(&raw, VerificationKind::EmailVerification)
            .await
            .unwrap()
            .is_none());
        assert_eq!(svc.consume(&raw, VerificationKind::EmailVerification).await.unwrap(), uid);
        assert!(matches!(svc.consume(&raw, VerificationKind::EmailVerification).await, Err(AuthError::TokenAlreadyUsed)));
    }

    #[tokio::test]
    async fn wrong_kind_or_unknown_is_not_found() {
        let svc = VerificationTokenService::new(Arc::new(MockAuthRepository::default()));
        let raw = svc.issue_default(Uuid::new_v4(), VerificationKind::PasswordReset).await.unwrap();
        assert!(matches!(svc.consume(&raw, VerificationKind::EmailVerification).await, Err(AuthError::TokenNotFound)));
        assert!(matches!(svc.consume("nope", VerificationKind::PasswordReset).await, Err(AuthError::TokenNotFound)));
    }

    #[tokio::test]
    async fn expired_token() {
        let svc = VerificationTokenService::new(Arc::new(MockAuthRepository::default()));
        let raw = svc.issue(Uuid::new_v4(), VerificationKind::EmailVerification, Duration::zero()).await.unwrap();
        assert!(matches!(svc.consume(&raw, VerificationKind::EmailVerification).await, Err(AuthError::TokenExpired)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_in_memory() {
        let svc = Arc::new(VerificationTokenService::new(Arc::new(MockAuthRepository::default())));
        let raw = svc.issue_default(Uuid::new_v4(), VerificationKind::EmailVerification).await.unwrap();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let svc = svc.clone();
            let raw = raw.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                svc.consume(&raw, VerificationKind::EmailVerification).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AuthError::TokenAlreadyUsed) => {}
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_against_database() {
        let repo = Arc::new(sqlite_repo().await);
        let user = repo.create_user("race@example.com", "Race", "user").await.unwrap();
        let svc = Arc::new(VerificationTokenService::new(repo.clone()));
        let raw = svc.issue_default(user.id, VerificationKind::PasswordReset).await.unwrap();
        let barrier = Arc::new(tokio::sync::Barrier::new(6));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let svc = svc.clone();
            let raw = raw.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                svc.consume(&raw, VerificationKind::PasswordReset).await
            }));
        }
        let results: Vec<_> = collect_results(handles).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(AuthError::TokenAlreadyUsed))));
    }

    async fn collect_results(handles: Vec<tokio::task::JoinHandle<Result<Uuid, AuthError>>>) -> Vec<Result<Uuid, AuthError>> {
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.await.unwrap());
        }
        out
    }
}
