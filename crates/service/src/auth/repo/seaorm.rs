use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::errors::ModelError;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::auth::domain::{AuthUser, Credentials, DeviceInfo, Session, VerificationKind, VerificationRecord};
use crate::auth::errors::AuthError;
use crate::auth::repository::{SessionRepository, UserRepository, VerificationTokenRepository};
use crate::auth::retry::retry_read_once;

/// Repository over the sea-orm entities. Reads are retried once on database
/// errors, writes are not.
#[derive(Clone)]
pub struct SeaOrmAuthRepository {
    pub db: DatabaseConnection,
}

impl SeaOrmAuthRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_user(u: models::user::Model) -> AuthUser {
    AuthUser {
        is_active: u.is_active(),
        id: u.id,
        email: u.email,
        name: u.name,
        role: u.role,
        is_verified: u.is_verified,
    }
}

fn to_credentials(c: models::user_credentials::Model) -> Credentials {
    Credentials { user_id: c.user_id, password_hash: c.password_hash, password_algorithm: c.password_algorithm }
}

fn to_session(s: models::session::Model) -> Session {
    Session {
        id: s.id,
        user_id: s.user_id,
        refresh_token_hash: s.refresh_token_hash,
        user_agent: s.user_agent,
        ip_address: s.ip_address,
        is_active: s.is_active,
        expires_at: s.expires_at.with_timezone(&Utc),
        created_at: s.created_at.with_timezone(&Utc),
        updated_at: s.updated_at.with_timezone(&Utc),
    }
}

fn to_record(t: models::verification_token::Model) -> Result<VerificationRecord, AuthError> {
    let kind = VerificationKind::parse(&t.token_type)
        .ok_or_else(|| AuthError::Infrastructure(format!("unknown verification token type {}", t.token_type)))?;
    Ok(VerificationRecord {
        id: t.id,
        user_id: t.user_id,
        token_hash: t.token_hash,
        kind,
        expires_at: t.expires_at.with_timezone(&Utc),
        is_used: t.is_used,
        created_at: t.created_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl UserRepository for SeaOrmAuthRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, AuthError> {
        let res = retry_read_once("find user by email", || async {
            Ok(models::user::find_by_email(&self.db, email).await?)
        })
        .await?;
        Ok(res.map(to_user))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError> {
        let res = retry_read_once("find user by id", || async { Ok(models::user::find_by_id(&self.db, id).await?) }).await?;
        Ok(res.map(to_user))
    }

    async fn create_user(&self, email: &str, name: &str, role: &str) -> Result<AuthUser, AuthError> {
        let created = models::user::create(&self.db, email, name, role).await.map_err(|e| match e {
            ModelError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::from(other),
        })?;
        Ok(to_user(created))
    }

    async fn mark_user_verified(&self, id: Uuid) -> Result<bool, AuthError> {
        models::user::mark_verified(&self.db, id).await.map_err(AuthError::from)
    }

    async fn get_credentials(&self, user_id: Uuid) -> Result<Option<Credentials>, AuthError> {
        let res = retry_read_once("get credentials", || async {
            Ok(models::user_credentials::find_by_user(&self.db, user_id).await?)
        })
        .await?;
        Ok(res.map(to_credentials))
    }

    async fn upsert_password(&self, user_id: Uuid, password_hash: String, password_algorithm: String) -> Result<Credentials, AuthError> {
        let c = models::user_credentials::upsert_password(&self.db, user_id, password_hash, &password_algorithm)
            .await
            .map_err(AuthError::from)?;
        Ok(to_credentials(c))
    }
}

#[async_trait]
impl SessionRepository for SeaOrmAuthRepository {
    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
        device: &DeviceInfo,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let input = models::session::NewSession {
            user_id,
            refresh_token_hash,
            user_agent: device.user_agent.as_deref(),
            ip_address: device.ip_address.as_deref(),
            expires_at,
        };
        let s = models::session::create(&self.db, input).await.map_err(AuthError::from)?;
        Ok(to_session(s))
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
        let res = retry_read_once("find session", || async { Ok(models::session::find_by_id(&self.db, id).await?) }).await?;
        Ok(res.map(to_session))
    }

    async fn find_session_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, AuthError> {
        let res = retry_read_once("find session by refresh hash", || async {
            Ok(models::session::find_by_refresh_hash(&self.db, refresh_token_hash).await?)
        })
        .await?;
        Ok(res.map(to_session))
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        let res = retry_read_once("list sessions", || async {
            Ok(models::session::list_active_for_user(&self.db, user_id).await?)
        })
        .await?;
        Ok(res.into_iter().map(to_session).collect())
    }

    async fn deactivate_session(&self, id: Uuid) -> Result<bool, AuthError> {
        models::session::deactivate(&self.db, id).await.map_err(AuthError::from)
    }

    async fn deactivate_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthError> {
        models::session::deactivate_all_for_user(&self.db, user_id).await.map_err(AuthError::from)
    }
}

#[async_trait]
impl VerificationTokenRepository for SeaOrmAuthRepository {
    async fn create_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        kind: VerificationKind,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationRecord, AuthError> {
        let t = models::verification_token::create(&self.db, user_id, token_hash, kind.as_str(), expires_at)
            .await
            .map_err(AuthError::from)?;
        to_record(t)
    }

    async fn find_verification_token(&self, token_hash: &str, kind: VerificationKind) -> Result<Option<VerificationRecord>, AuthError> {
        let res = retry_read_once("find verification token", || async {
            Ok(models::verification_token::find_by_hash(&self.db, token_hash, kind.as_str()).await?)
        })
        .await?;
        res.map(to_record).transpose()
    }

    async fn mark_verification_token_used(&self, id: Uuid) -> Result<bool, AuthError> {
        models::verification_token::mark_used(&self.db, id).await.map_err(AuthError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sqlite_repo;

    #[tokio::test]
    async fn user_and_credentials() {
        let repo = sqlite_repo().await;
        let user = repo.create_user("Repo@Example.com", "Repo", "user").await.unwrap();
        assert_eq!(user.email, "repo@example.com");
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert!(matches!(repo.create_user("repo@example.com", "Again", "user").await, Err(AuthError::UserAlreadyExists)));

        let found = repo.find_user_by_email("REPO@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(repo.mark_user_verified(user.id).await.unwrap());
        assert!(repo.find_user_by_id(user.id).await.unwrap().unwrap().is_verified);

        assert!(repo.get_credentials(user.id).await.unwrap().is_none());
        repo.upsert_password(user.id, "$2b$04$x".into(), "bcrypt".into()).await.unwrap();
        repo.upsert_password(user.id, "$argon2id$y".into(), "argon2".into()).await.unwrap();
        let creds = repo.get_credentials(user.id).await.unwrap().unwrap();
        assert_eq!(creds.password_algorithm, "argon2");
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        let repo = sqlite_repo().await;
        let user = repo.create_user("s@example.com", "S", "user").await.unwrap();
        let hash = common::crypto::hash_token("refresh");
        let device = DeviceInfo { user_agent: Some("ua".into()), ip_address: Some("10.0.0.1".into()) };
        let s = repo
            .create_session(user.id, &hash, &device, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(repo.find_session_by_refresh_hash(&hash).await.unwrap().unwrap().id, s.id);
        assert_eq!(repo.list_active_sessions(user.id).await.unwrap().len(), 1);
        assert!(repo.deactivate_session(s.id).await.unwrap());
        assert!(!repo.find_session(s.id).await.unwrap().unwrap().is_active);
        assert!(repo.list_active_sessions(user.id).await.unwrap().is_empty());
        assert!(!repo.deactivate_session(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_session_reference_is_not_a_user_conflict() {
        let repo = sqlite_repo().await;
        let user = repo.create_user("dup@example.com", "D", "user").await.unwrap();
        let hash = common::crypto::hash_token("same-refresh");
        let expires = Utc::now() + chrono::Duration::hours(1);
        repo.create_session(user.id, &hash, &DeviceInfo::default(), expires).await.unwrap();

        let err = repo.create_session(user.id, &hash, &DeviceInfo::default(), expires).await.unwrap_err();
        assert!(err.is_infrastructure(), "got {err:?}");
    }

    #[tokio::test]
    async fn verification_tokens_are_typed() {
        let repo = sqlite_repo().await;
        let user = repo.create_user("v@example.com", "V", "user").await.unwrap();
        let hash = common::crypto::hash_token("raw");
        let rec = repo
            .create_verification_token(user.id, &hash, VerificationKind::PasswordReset, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(repo.find_verification_token(&hash, VerificationKind::EmailVerification).await.unwrap().is_none());
        let found = repo.find_verification_token(&hash, VerificationKind::PasswordReset).await.unwrap().unwrap();
        assert_eq!(found.id, rec.id);
        assert!(repo.mark_verification_token_used(rec.id).await.unwrap());
        assert!(!repo.mark_verification_token_used(rec.id).await.unwrap());
    }
}
