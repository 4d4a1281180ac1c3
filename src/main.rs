// ============================================================================
// Module: src/main.rs
// Description: Combined binary wiring invoice-auth/invoice-platform/
// invoice-core behind one HTTP listener, spec §6
// ============================================================================

mod health;
mod security;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use invoice_auth::services::jwt::JwtService;
use invoice_auth::services::AuthService;
use invoice_core::services::object_store::{ObjectStore, S3ObjectStore};
use invoice_core::services::vision_extractor::VisionExtractor;
use invoice_shared::config::AppConfig;
use invoice_shared::database::{ConnectionPool, DbPool};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// State shared only by the `/health`/`/ready`/`/live` endpoints this
/// binary owns directly; each mounted service keeps its own `AppState`.
pub struct AppContext {
    pub pool: DbPool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "invoice=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    config.validate().map_err(anyhow::Error::msg)?;
    info!("configuration loaded");

    let pool: DbPool = ConnectionPool::new(config.database_pool_config()).await?.pool().clone();
    info!("database connected");

    let object_store: Arc<dyn ObjectStore> =
        Arc::new(S3ObjectStore::from_env(config.object_store.public_url_base.clone()).await);
    let vision = Arc::new(VisionExtractor::new(config.vision.clone()));
    let config = Arc::new(config);

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        &config.jwt.issuer,
        &config.jwt.algorithm,
        config.jwt.expire_minutes,
        config.jwt.leeway,
    )?;
    let auth_service = Arc::new(AuthService::new(pool.clone(), jwt_service));

    let core_state = Arc::new(invoice_core::AppState::new(pool.clone(), object_store, vision, config.clone()));
    let platform_state = Arc::new(invoice_platform::AppState::new(pool.clone(), "platform/templates"));

    let app_context = Arc::new(AppContext { pool: pool.clone() });

    let api = Router::new()
        .merge(invoice_auth::create_router(auth_service))
        .merge(invoice_platform::create_router(platform_state))
        .merge(invoice_core::create_router(core_state));

    let app = Router::new()
        .nest("/api", api)
        .merge(health::router(app_context))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security::cors_layer(&config.server.cors_origins))
                .layer(axum::middleware::from_fn(security::security_headers))
                .layer(CompressionLayer::new().gzip(true)),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "invoice-server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
