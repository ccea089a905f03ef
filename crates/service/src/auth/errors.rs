use thiserror::Error;

/// Business errors for auth workflows.
///
/// Everything except `Infrastructure` is a terminal domain outcome that is
/// surfaced to the caller as-is. `Infrastructure` wraps store/cache failures;
/// its message is for logs only and never reaches an HTTP body.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("session expired")]
    SessionExpired,
    #[error("session not found")]
    SessionNotFound,
    #[error("token already used")]
    TokenAlreadyUsed,
    #[error("token not found")]
    TokenNotFound,
    #[error("password too weak: {}", .0.join("; "))]
    PasswordTooWeak(Vec<String>),
    #[error("user inactive")]
    UserInactive,
    #[error("user not verified")]
    UserNotVerified,
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl AuthError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Validation(_) => 1001,
            AuthError::UserAlreadyExists => 1002,
            AuthError::UserNotFound => 1003,
            AuthError::InvalidCredentials => 1004,
            AuthError::PasswordTooWeak(_) => 1005,
            AuthError::UserInactive => 1006,
            AuthError::UserNotVerified => 1007,
            AuthError::TokenExpired => 1101,
            AuthError::TokenInvalid => 1102,
            AuthError::TokenNotFound => 1103,
            AuthError::TokenAlreadyUsed => 1104,
            AuthError::SessionExpired => 1151,
            AuthError::SessionNotFound => 1152,
            AuthError::Infrastructure(_) => 1200,
        }
    }

    /// Stable machine-readable name, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_failed",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::SessionExpired => "session_expired",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::TokenAlreadyUsed => "token_already_used",
            AuthError::TokenNotFound => "token_not_found",
            AuthError::PasswordTooWeak(_) => "password_too_weak",
            AuthError::UserInactive => "user_inactive",
            AuthError::UserNotVerified => "user_not_verified",
            AuthError::UserAlreadyExists => "user_already_exists",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Infrastructure(_) => "internal_error",
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::Infrastructure(_))
    }

    pub fn infra(context: &str, err: impl std::fmt::Display) -> Self {
        AuthError::Infrastructure(format!("{context}: {err}"))
    }
}

impl From<models::errors::ModelError> for AuthError {
    fn from(e: models::errors::ModelError) -> Self {
        match e {
            models::errors::ModelError::Validation(msg) => AuthError::Validation(msg),
            // only user creation gives a unique violation a domain meaning;
            // the repository maps that case itself
            models::errors::ModelError::Conflict(msg) => AuthError::Infrastructure(format!("unique constraint: {msg}")),
            models::errors::ModelError::Db(msg) => AuthError::Infrastructure(msg),
        }
    }
}
