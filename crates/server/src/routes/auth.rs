use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use service::auth::domain::{AuthSession, AuthUser, DeviceInfo, LoginInput, RegisterInput, Session};
use service::auth::repo::SeaOrmAuthRepository;
use service::auth::service::{AuthService, ChangePasswordInput};
use service::auth::token::{Claims, IssuedToken};

use crate::errors::ApiError;

#[derive(Clone)]
pub struct ServerState {
    pub auth: Arc<AuthService<SeaOrmAuthRepository>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct LogoutAllOutput {
    pub sessions_closed: u64,
}

#[derive(Serialize)]
pub struct ChangePasswordOutput {
    /// Present when the other sessions were logged out.
    pub session: Option<AuthSession>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Device info from `User-Agent` and the first `X-Forwarded-For` hop.
pub fn device_info(headers: &HeaderMap) -> DeviceInfo {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    DeviceInfo {
        user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
        ip_address: header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string),
    }
}

/// Validates `Authorization: Bearer <access token>` and stores the claims as
/// a request extension.
pub async fn require_bearer(State(state): State<ServerState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let token = match bearer_token(req.headers()) {
        Some(t) => t.to_string(),
        None => {
            tracing::warn!(path = %path, "missing bearer token");
            return Err(ApiError::MissingToken);
        }
    };
    let claims = state.auth.authenticate(&token).await.map_err(|e| {
        tracing::warn!(path = %path, error = %e, "bearer token rejected");
        ApiError::from(e)
    })?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[utoipa::path(post, path = "/auth/register", tag = "auth", request_body = crate::openapi::RegisterRequest,
    responses((status = 201, description = "Registered", body = crate::openapi::AuthSessionDoc), (status = 400, description = "Weak password or invalid input"), (status = 409, description = "Email taken")))]
pub async fn register(State(state): State<ServerState>, headers: HeaderMap, Json(input): Json<RegisterInput>) -> Result<(StatusCode, Json<AuthSession>), ApiError> {
    let session = state.auth.register(input, device_info(&headers)).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(post, path = "/auth/login", tag = "auth", request_body = crate::openapi::LoginRequest,
    responses((status = 200, description = "Logged in", body = crate::openapi::AuthSessionDoc), (status = 401, description = "Invalid credentials"), (status = 403, description = "Inactive or unverified")))]
pub async fn login(State(state): State<ServerState>, headers: HeaderMap, Json(input): Json<LoginInput>) -> Result<Json<AuthSession>, ApiError> {
    Ok(Json(state.auth.login(input, device_info(&headers)).await?))
}

#[utoipa::path(post, path = "/auth/refresh", tag = "auth", request_body = RefreshRequest,
    responses((status = 200, description = "New access token", body = crate::openapi::AccessTokenDoc), (status = 401, description = "Invalid token or session")))]
pub async fn refresh(State(state): State<ServerState>, Json(input): Json<RefreshRequest>) -> Result<Json<IssuedToken>, ApiError> {
    Ok(Json(state.auth.refresh(&input.refresh_token).await?))
}

/// The access token, when sent as a bearer header, is revoked as well.
#[utoipa::path(post, path = "/auth/logout", tag = "auth", request_body = LogoutRequest,
    responses((status = 204, description = "Logged out"), (status = 401, description = "Unknown session")))]
pub async fn logout(State(state): State<ServerState>, headers: HeaderMap, Json(input): Json<LogoutRequest>) -> Result<StatusCode, ApiError> {
    state.auth.logout(&input.refresh_token, bearer_token(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/auth/logout-all", tag = "auth", security(("bearer" = [])),
    responses((status = 200, description = "All sessions closed")))]
pub async fn logout_all(State(state): State<ServerState>, Extension(claims): Extension<Claims>) -> Result<Json<LogoutAllOutput>, ApiError> {
    let sessions_closed = state.auth.logout_all(claims.uid).await?;
    Ok(Json(LogoutAllOutput { sessions_closed }))
}

#[utoipa::path(post, path = "/auth/change-password", tag = "auth", request_body = ChangePasswordRequest, security(("bearer" = [])),
    responses((status = 200, description = "Password changed"), (status = 400, description = "Weak password"), (status = 401, description = "Wrong current password")))]
pub async fn change_password(
    State(state): State<ServerState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(input): Json<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordOutput>, ApiError> {
    let input = ChangePasswordInput { current_password: input.current_password, new_password: input.new_password };
    let session = state.auth.change_password(claims.uid, input, device_info(&headers)).await?;
    Ok(Json(ChangePasswordOutput { session }))
}

#[utoipa::path(get, path = "/auth/verify-email", tag = "auth", params(("token" = String, Query, description = "Token from the verification mail")),
    responses((status = 200, description = "Email verified", body = crate::openapi::UserDoc), (status = 404, description = "Unknown token"), (status = 410, description = "Token already used")))]
pub async fn verify_email(State(state): State<ServerState>, Query(q): Query<VerifyEmailQuery>) -> Result<Json<AuthUser>, ApiError> {
    Ok(Json(state.auth.verify_email(&q.token).await?))
}

#[utoipa::path(post, path = "/auth/forgot-password", tag = "auth", request_body = ForgotPasswordRequest,
    responses((status = 202, description = "Reset mail sent if the account exists")))]
pub async fn forgot_password(State(state): State<ServerState>, Json(input): Json<ForgotPasswordRequest>) -> Result<StatusCode, ApiError> {
    state.auth.request_password_reset(&input.email).await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(post, path = "/auth/reset-password", tag = "auth", request_body = ResetPasswordRequest,
    responses((status = 204, description = "Password reset"), (status = 400, description = "Weak password"), (status = 404, description = "Unknown token"), (status = 410, description = "Token already used")))]
pub async fn reset_password(State(state): State<ServerState>, Json(input): Json<ResetPasswordRequest>) -> Result<StatusCode, ApiError> {
    state.auth.reset_password(&input.token, &input.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/auth/sessions", tag = "auth", security(("bearer" = [])),
    responses((status = 200, description = "Active sessions", body = [crate::openapi::SessionDoc])))]
pub async fn sessions(State(state): State<ServerState>, Extension(claims): Extension<Claims>) -> Result<Json<Vec<Session>>, ApiError> {
    Ok(Json(state.auth.list_sessions(claims.uid).await?))
}

#[utoipa::path(get, path = "/auth/me", tag = "auth", security(("bearer" = [])),
    responses((status = 200, description = "Current user", body = crate::openapi::UserDoc)))]
pub async fn me(State(state): State<ServerState>, Extension(claims): Extension<Claims>) -> Result<Json<AuthUser>, ApiError> {
    Ok(Json(state.auth.current_user(claims.uid).await?))
}
