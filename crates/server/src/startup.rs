use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::utils::logging::init_logging_from_env;
use configs::{AppConfig, AuthSettings};
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use service::auth::mail::{LogMailSender, Mailer};
use service::auth::repo::SeaOrmAuthRepository;
use service::auth::revocation::{MokaRevocationStore, RevocationStore};
use service::auth::AuthService;

use crate::errors::StartupError;
use crate::routes::{self, auth};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Redis when `auth.redis_url` is set (and the `redis` feature is on),
/// otherwise the in-process cache.
async fn build_revocation_store(settings: &AuthSettings) -> Result<Arc<dyn RevocationStore>, StartupError> {
    match settings.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = service::auth::revocation::RedisRevocationStore::connect(url)
                .await
                .map_err(|e| StartupError::Dependency(e.to_string()))?;
            info!("revocation store: redis");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("auth.redis_url is set but the redis feature is disabled; using the in-process revocation store");
            Ok(Arc::new(MokaRevocationStore::new(settings.cache_max_entries)))
        }
        None => {
            info!(max_entries = settings.cache_max_entries, "revocation store: in-process");
            Ok(Arc::new(MokaRevocationStore::new(settings.cache_max_entries)))
        }
    }
}

/// Connect, migrate and wire the auth service.
pub async fn build_state(cfg: &AppConfig) -> Result<auth::ServerState, StartupError> {
    if cfg.auth.jwt_secret == configs::auth::DEV_JWT_SECRET {
        warn!("auth.allow_dev_secret is on: tokens are signed with the public development secret");
    }
    let db = models::db::connect_with_config(&cfg.database).await?;
    models::db::migrate(&db).await?;
    let store = build_revocation_store(&cfg.auth).await?;
    let repo = Arc::new(SeaOrmAuthRepository::new(db));
    let svc = AuthService::from_settings(repo, &cfg.auth, store, Mailer::enabled(LogMailSender))
        .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
    Ok(auth::ServerState { auth: Arc::new(svc) })
}

pub fn build_app(state: auth::ServerState) -> Router {
    routes::build_router(state, build_cors())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received Ctrl+C, shutting down");
}

/// Public entry: build the app and run the HTTP server
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging_from_env();

    let cfg = AppConfig::load_or_env().map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
    let state = build_state(&cfg).await?;
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "starting auth server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}
