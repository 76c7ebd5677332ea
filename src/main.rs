use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shiftsync_import::config::ImportConfig;
use shiftsync_import::handlers;
use shiftsync_import::repository::SqliteRepository;
use shiftsync_import::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shiftsync_import=debug,tower_http=debug")),
        )
        .init();

    let config_path = std::env::var("SHIFTSYNC_CONFIG").unwrap_or_else(|_| "./shiftsync.toml".to_string());
    let config = Arc::new(ImportConfig::load(&config_path)?);

    let repo = Arc::new(SqliteRepository::open(&config.database.path)?);
    tracing::info!(path = %config.database.path, "repository opened");

    let state = AppState { repo, config };

    let app = Router::new()
        .route("/api/v1/import", post(handlers::import::import))
        .route(
            "/api/v1/schedule-versions/{id}/promote",
            post(handlers::schedule_version::promote),
        )
        .route(
            "/api/v1/schedule-versions/{id}/archive",
            post(handlers::schedule_version::archive),
        )
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("shiftsync-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
