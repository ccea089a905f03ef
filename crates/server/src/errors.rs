use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use service::auth::AuthError;

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("missing bearer token")]
    MissingToken,
}

pub fn status_for(e: &AuthError) -> StatusCode {
    match e {
        AuthError::Validation(_) | AuthError::PasswordTooWeak(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::TokenExpired
        | AuthError::TokenInvalid
        | AuthError::SessionExpired
        | AuthError::SessionNotFound => StatusCode::UNAUTHORIZED,
        AuthError::UserInactive | AuthError::UserNotVerified => StatusCode::FORBIDDEN,
        AuthError::UserNotFound | AuthError::TokenNotFound => StatusCode::NOT_FOUND,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::TokenAlreadyUsed => StatusCode::GONE,
        AuthError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::MissingToken => {
                let body = json!({"error": "missing_token", "message": "missing bearer token"});
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            ApiError::Auth(e) => e,
        };
        let status = status_for(&e);
        let body = match &e {
            AuthError::Infrastructure(detail) => {
                error!(code = e.code(), error = %detail, "request failed on infrastructure");
                json!({"error": e.kind(), "message": "internal server error"})
            }
            AuthError::PasswordTooWeak(reasons) => {
                json!({"error": e.kind(), "message": e.to_string(), "reasons": reasons})
            }
            _ => json!({"error": e.kind(), "message": e.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("dependency unavailable: {0}")]
    Dependency(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(status_for(&AuthError::PasswordTooWeak(vec![])), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::UserNotVerified), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AuthError::TokenNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::TokenAlreadyUsed), StatusCode::GONE);
        assert_eq!(status_for(&AuthError::Infrastructure("db".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn infrastructure_details_stay_out_of_the_body() {
        let resp = ApiError::from(AuthError::Infrastructure("password=hunter2 at db-1".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_error");
        assert!(!body.to_string().contains("hunter2"));
    }
}
