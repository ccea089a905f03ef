use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use configs::auth::AuthSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::domain::{AuthSession, AuthUser, DeviceInfo, LoginInput, RegisterInput, Session, VerificationKind};
use super::errors::AuthError;
use super::mail::{Mailer, OutgoingMail};
use super::password::PasswordHasher;
use super::repository::AuthRepository;
use super::revocation::RevocationStore;
use super::session::SessionStore;
use super::token::{Claims, IssuedToken, TokenConfig, TokenIssuer, TokenKind, TokenPair};
use super::verification::VerificationTokenService;

/// Workflow knobs that are not owned by a single component.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub verification_ttl: Duration,
    pub password_reset_ttl: Duration,
    /// How long `user:blacklist:<id>` entries live.
    pub user_revocation_ttl: StdDuration,
    pub require_verified_email: bool,
    pub logout_other_sessions_on_password_change: bool,
}

impl AuthConfig {
    pub fn from_settings(s: &AuthSettings) -> Self {
        Self {
            verification_ttl: Duration::seconds(s.verification_token_ttl_secs),
            password_reset_ttl: Duration::seconds(s.password_reset_token_ttl_secs),
            user_revocation_ttl: StdDuration::from_secs(s.user_revocation_ttl().max(0) as u64),
            require_verified_email: s.require_verified_email,
            logout_other_sessions_on_password_change: s.logout_other_sessions_on_password_change,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from_settings(&AuthSettings::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// Auth business service independent of web framework
pub struct AuthService<R: AuthRepository> {
    repo: Arc<R>,
    cfg: AuthConfig,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenIssuer>,
    sessions: SessionStore<R>,
    verifications: VerificationTokenService<R>,
    mailer: Mailer,
}

impl<R: AuthRepository> AuthService<R> {
    pub fn new(repo: Arc<R>, cfg: AuthConfig, hasher: Arc<PasswordHasher>, tokens: Arc<TokenIssuer>, mailer: Mailer) -> Self {
        Self {
            sessions: SessionStore::new(repo.clone()),
            verifications: VerificationTokenService::new(repo.clone()),
            repo,
            cfg,
            hasher,
            tokens,
            mailer,
        }
    }

    /// Wire every component from the `[auth]` settings.
    pub fn from_settings(
        repo: Arc<R>,
        settings: &AuthSettings,
        store: Arc<dyn RevocationStore>,
        mailer: Mailer,
    ) -> Result<Self, AuthError> {
        let hasher = Arc::new(PasswordHasher::from_settings(settings)?);
        let tokens = Arc::new(TokenIssuer::new(TokenConfig::from_settings(settings), store));
        Ok(Self::new(repo, AuthConfig::from_settings(settings), hasher, tokens, mailer))
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::infra("hash task", e))?
    }

    async fn verify_password(&self, password: &str, hash: Option<&str>) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.map(str::to_string);
        tokio::task::spawn_blocking(move || match hash {
            Some(h) => hasher.verify(&password, &h),
            None => {
                hasher.verify_dummy(&password);
                false
            }
        })
        .await
        .map_err(|e| AuthError::infra("verify task", e))
    }

    async fn start_session(&self, user: &AuthUser, device: &DeviceInfo) -> Result<(TokenPair, Session), AuthError> {
        self.tokens.sync_revocation_floor(user.id).await?;
        let pair = self.tokens.generate(user.id, &user.email, &user.role, &user.name)?;
        let reference = common::crypto::hash_token(&pair.refresh_token);
        let session = self
            .sessions
            .create(user.id, device, &reference, self.tokens.config().refresh_ttl)
            .await?;
        Ok((pair, session))
    }

    async fn send_token(&self, user: &AuthUser, kind: VerificationKind, ttl: Duration) -> Result<(), AuthError> {
        let token = self.verifications.issue(user.id, kind, ttl).await?;
        self.mailer.dispatch(OutgoingMail { to: user.email.clone(), kind, token });
        Ok(())
    }

    /// Register a new user and log them in on the calling device.
    ///
    /// # Examples
    /// ```
    /// use service::auth::{service::{AuthService, AuthConfig}, repository::mock::MockAuthRepository};
    /// use service::auth::{domain::{DeviceInfo, RegisterInput}, mail::Mailer, password::{PasswordHasher, PasswordPolicy}};
    /// use service::auth::{revocation::MokaRevocationStore, token::{TokenConfig, TokenIssuer}};
    /// use configs::auth::AuthSettings;
    /// use std::sync::Arc;
    /// let settings = AuthSettings { jwt_secret: "secret".into(), hash_cost: 4, ..AuthSettings::default() };
    /// let svc = AuthService::from_settings(
    ///     Arc::new(MockAuthRepository::default()),
    ///     &settings,
    ///     Arc::new(MokaRevocationStore::default()),
    ///     Mailer::Disabled,
    /// ).unwrap();
    /// let input = RegisterInput { email: "user@example.com".into(), name: "Test".into(), password: "Secr3t!pass".into() };
    /// let session = tokio_test::block_on(svc.register(input, DeviceInfo::default())).unwrap();
    /// assert_eq!(session.user.email, "user@example.com");
    /// assert!(!session.user.is_verified);
    /// ```
    #[instrument(skip(self, input, device), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput, device: DeviceInfo) -> Result<AuthSession, AuthError> {
        self.hasher.check_strength(&input.password)?;
        if let Some(existing) = self.repo.find_user_by_email(&input.email).await? {
            debug!("user exists: {}", existing.email);
            return Err(AuthError::UserAlreadyExists);
        }

        let hash = self.hash_password(&input.password).await?;
        let user = self.repo.create_user(&input.email, &input.name, models::user::DEFAULT_ROLE).await?;
        self.repo
            .upsert_password(user.id, hash, self.hasher.algorithm().as_str().to_string())
            .await?;
        let (tokens, session) = self.start_session(&user, &device).await?;
        info!(user_id = %user.id, email = %user.email, session_id = %session.id, "user_registered");

        if let Err(e) = self.send_token(&user, VerificationKind::EmailVerification, self.cfg.verification_ttl).await {
            warn!(user_id = %user.id, error = %e, "verification mail not sent");
        }
        Ok(AuthSession { user, tokens, session_id: session.id })
    }

    /// Authenticate with email and password and open a session.
    #[instrument(skip(self, input, device), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput, device: DeviceInfo) -> Result<AuthSession, AuthError> {
        let user = self.repo.find_user_by_email(&input.email).await?;
        let creds = match &user {
            Some(u) => self.repo.get_credentials(u.id).await?,
            None => None,
        };
        let stored_hash = creds.as_ref().map(|c| c.password_hash.as_str());
        let ok = self.verify_password(&input.password, stored_hash).await?;
        let (user, creds) = match (user, creds) {
            (Some(u), Some(c)) if ok => (u, c),
            _ => {
                debug!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        if self.cfg.require_verified_email && !user.is_verified {
            return Err(AuthError::UserNotVerified);
        }

        if self.hasher.needs_rehash(&creds.password_hash) {
            match self.hash_password(&input.password).await {
                Ok(hash) => {
                    let algorithm = self.hasher.algorithm().as_str().to_string();
                    match self.repo.upsert_password(user.id, hash, algorithm).await {
                        Ok(_) => info!(user_id = %user.id, "password_rehashed"),
                        Err(e) => warn!(user_id = %user.id, error = %e, "password rehash not stored"),
                    }
                }
                Err(e) => warn!(user_id = %user.id, error = %e, "password rehash failed"),
            }
        }

        let (tokens, session) = self.start_session(&user, &device).await?;
        info!(user_id = %user.id, session_id = %session.id, "user_logged_in");
        Ok(AuthSession { user, tokens, session_id: session.id })
    }

    /// New access token for a refresh token whose session is still live.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        let claims = self.tokens.validate_refresh(refresh_token).await?;
        let session = self.sessions.find_by_refresh_token(refresh_token).await?;
        if !session.is_active || session.user_id != claims.uid {
            return Err(AuthError::SessionNotFound);
        }
        let access = self.tokens.access_for_user(claims.uid, self.repo.as_ref()).await?;
        debug!(user_id = %claims.uid, session_id = %session.id, "access_token_refreshed");
        Ok(access)
    }

    /// Close the session owning the refresh token, then revoke the refresh
    /// token and, when given, the caller's access token.
    ///
    /// The session is closed first so a failed revocation never leaves it
    /// listed as live. The access token is revoked best-effort and only when
    /// it is an access token of the session's owner.
    #[instrument(skip(self, refresh_token, access_token))]
    pub async fn logout(&self, refresh_token: &str, access_token: Option<&str>) -> Result<(), AuthError> {
        let reference = common::crypto::hash_token(refresh_token);
        let session = self
            .repo
            .find_session_by_refresh_hash(&reference)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        self.sessions.deactivate(session.id).await?;

        let ttl = StdDuration::from_secs(self.tokens.config().refresh_ttl.num_seconds().max(0) as u64);
        self.tokens.revoke(refresh_token, ttl).await?;
        if let Some(access) = access_token {
            self.revoke_caller_access(access, session.user_id, ttl).await;
        }
        info!(user_id = %session.user_id, session_id = %session.id, "user_logged_out");
        Ok(())
    }

    async fn revoke_caller_access(&self, access_token: &str, owner: Uuid, ttl: StdDuration) {
        match self.tokens.inspect(access_token) {
            Ok(claims) if claims.uid == owner && claims.typ == TokenKind::Access => {
                if let Err(e) = self.tokens.revoke(access_token, ttl).await {
                    warn!(user_id = %owner, error = %e, "access token not revoked on logout");
                }
            }
            Ok(claims) => {
                warn!(user_id = %owner, token_user = %claims.uid, typ = ?claims.typ, "access token does not belong to the session, ignored");
            }
            Err(e) => warn!(user_id = %owner, error = %e, "unreadable access token on logout, ignored"),
        }
    }

    /// Close every session and reject every token issued so far.
    #[instrument(skip(self))]
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let closed = self.sessions.deactivate_all(user_id).await?;
        self.tokens.revoke_all_for_user(user_id, self.cfg.user_revocation_ttl).await?;
        info!(user_id = %user_id, sessions = closed, "user_logged_out_everywhere");
        Ok(closed)
    }

    /// Returns a fresh session for the calling device when other sessions
    /// were logged out.
    #[instrument(skip(self, input, device))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordInput,
        device: DeviceInfo,
    ) -> Result<Option<AuthSession>, AuthError> {
        let user = self.repo.find_user_by_id(user_id).await?.ok_or(AuthError::UserNotFound)?;
        let creds = self.repo.get_credentials(user_id).await?;
        let ok = self
            .verify_password(&input.current_password, creds.as_ref().map(|c| c.password_hash.as_str()))
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }
        self.hasher.check_strength(&input.new_password)?;

        let hash = self.hash_password(&input.new_password).await?;
        self.repo
            .upsert_password(user_id, hash, self.hasher.algorithm().as_str().to_string())
            .await?;
        info!(user_id = %user_id, "password_changed");

        if !self.cfg.logout_other_sessions_on_password_change {
            return Ok(None);
        }
        self.logout_all(user_id).await?;
        let (tokens, session) = self.start_session(&user, &device).await?;
        Ok(Some(AuthSession { user, tokens, session_id: session.id }))
    }

    #[instrument(skip(self, token))]
    pub async fn verify_email(&self, token: &str) -> Result<AuthUser, AuthError> {
        let user_id = self.verifications.consume(token, VerificationKind::EmailVerification).await?;
        if !self.repo.mark_user_verified(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        let user = self.repo.find_user_by_id(user_id).await?.ok_or(AuthError::UserNotFound)?;
        info!(user_id = %user_id, "email_verified");
        Ok(user)
    }

    /// Unknown or inactive accounts get the same silent success.
    #[instrument(skip(self, email))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        match self.repo.find_user_by_email(email).await? {
            Some(user) if user.is_active => {
                self.send_token(&user, VerificationKind::PasswordReset, self.cfg.password_reset_ttl).await?;
                info!(user_id = %user.id, "password_reset_requested");
            }
            _ => debug!("password reset requested for unknown or inactive account"),
        }
        Ok(())
    }

    /// Set a new password with a reset token and log out everywhere.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        self.hasher.check_strength(new_password)?;
        let user_id = self.verifications.consume(token, VerificationKind::PasswordReset).await?;
        let hash = self.hash_password(new_password).await?;
        self.repo
            .upsert_password(user_id, hash, self.hasher.algorithm().as_str().to_string())
            .await?;
        self.logout_all(user_id).await?;
        info!(user_id = %user_id, "password_reset");
        Ok(())
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        self.sessions.list_active(user_id).await
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<AuthUser, AuthError> {
        self.repo.find_user_by_id(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    /// Bearer check for protected endpoints.
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.tokens.validate_access(access_token).await
    }
}
