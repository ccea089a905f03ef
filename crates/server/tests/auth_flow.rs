use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use configs::auth::AuthSettings;
use server::routes::auth::ServerState;
use service::auth::mail::Mailer;
use service::auth::repo::SeaOrmAuthRepository;
use service::auth::revocation::MokaRevocationStore;
use service::auth::AuthService;

async fn build_app() -> anyhow::Result<Router> {
    let db = models::db::connect_sqlite_temp().await?;
    let settings = AuthSettings { jwt_secret: "test-secret".into(), hash_cost: 4, ..AuthSettings::default() };
    let svc = AuthService::from_settings(
        Arc::new(SeaOrmAuthRepository::new(db)),
        &settings,
        Arc::new(MokaRevocationStore::default()),
        Mailer::Disabled,
    )?;
    Ok(server::startup::build_app(ServerState { auth: Arc::new(svc) }))
}

async fn send(app: &Router, method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "integration-test")
        .header("x-forwarded-for", "198.51.100.4");
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(serde_json::to_vec(&b)?))?,
        None => req.body(Body::empty())?,
    };
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, value))
}

const PASSWORD: &str = "S3cure!Pass";

#[tokio::test]
async fn health_and_docs() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (status, body) = send(&app, "GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/auth/login"].is_object());
    Ok(())
}

#[tokio::test]
async fn register_login_refresh_logout() -> anyhow::Result<()> {
    let app = build_app().await?;

    let (status, reg) = send(&app, "POST", "/auth/register", None, Some(json!({"email": "flow@example.com", "name": "Flow", "password": PASSWORD}))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reg["user"]["email"], "flow@example.com");
    assert_eq!(reg["tokens"]["token_type"], "Bearer");

    let (status, body) = send(&app, "POST", "/auth/register", None, Some(json!({"email": "FLOW@example.com", "name": "Again", "password": PASSWORD}))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "user_already_exists");

    let (status, body) = send(&app, "POST", "/auth/login", None, Some(json!({"email": "flow@example.com", "password": "wrong"}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, login) = send(&app, "POST", "/auth/login", None, Some(json!({"email": "flow@example.com", "password": PASSWORD}))).await?;
    assert_eq!(status, StatusCode::OK);
    let access = login["tokens"]["access_token"].as_str().unwrap().to_string();
    let refresh = login["tokens"]["refresh_token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, "GET", "/auth/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "flow@example.com");

    let (status, sessions) = send(&app, "GET", "/auth/sessions", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["ip_address"], "198.51.100.4");
    assert!(sessions[0].get("refresh_token_hash").is_none());

    let (status, new_access) = send(&app, "POST", "/auth/refresh", None, Some(json!({"refresh_token": refresh}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(new_access["token"].is_string());

    let (status, _) = send(&app, "POST", "/auth/refresh", None, Some(json!({"refresh_token": access}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "POST", "/auth/logout", Some(&access), Some(json!({"refresh_token": refresh}))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "POST", "/auth/refresh", None, Some(json!({"refresh_token": refresh}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_invalid");
    let (status, _) = send(&app, "GET", "/auth/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn protected_routes_need_bearer() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (status, body) = send(&app, "GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_token");
    let (status, body) = send(&app, "POST", "/auth/logout-all", Some("garbage"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_invalid");
    Ok(())
}

#[tokio::test]
async fn weak_password_lists_reasons() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (status, body) = send(&app, "POST", "/auth/register", None, Some(json!({"email": "weak@example.com", "name": "Weak", "password": "password123"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "password_too_weak");
    assert_eq!(body["reasons"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn logout_all_and_change_password() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (_, reg) = send(&app, "POST", "/auth/register", None, Some(json!({"email": "multi@example.com", "name": "Multi", "password": PASSWORD}))).await?;
    let access = reg["tokens"]["access_token"].as_str().unwrap().to_string();

    let (status, changed) = send(&app, "POST", "/auth/change-password", Some(&access), Some(json!({"current_password": PASSWORD, "new_password": "N3w!Secret"}))).await?;
    assert_eq!(status, StatusCode::OK);
    let fresh = changed["session"]["tokens"]["access_token"].as_str().unwrap().to_string();
    let (status, _) = send(&app, "GET", "/auth/me", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, out) = send(&app, "POST", "/auth/logout-all", Some(&fresh), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["sessions_closed"], 1);
    let (status, _) = send(&app, "GET", "/auth/me", Some(&fresh), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, login) = send(&app, "POST", "/auth/login", None, Some(json!({"email": "multi@example.com", "password": "N3w!Secret"}))).await?;
    assert_eq!(status, StatusCode::OK);
    let access = login["tokens"]["access_token"].as_str().unwrap();
    let (status, _) = send(&app, "GET", "/auth/me", Some(access), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn verification_endpoints_without_mailer() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (status, body) = send(&app, "GET", "/auth/verify-email?token=unknown", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "token_not_found");

    let (status, _) = send(&app, "POST", "/auth/forgot-password", None, Some(json!({"email": "nobody@example.com"}))).await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, "POST", "/auth/reset-password", None, Some(json!({"token": "unknown", "new_password": "N3w!Secret"}))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "token_not_found");
    Ok(())
}
