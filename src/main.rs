use axum::routing::get;
use axum::Router;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use caseserver::config::AppConfig;
use caseserver::shared::AppState;
use caseserver::{catalog, conversion, deals, leads, projects};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config));

    let app = Router::new()
        .merge(leads::configure())
        .merge(deals::configure())
        .merge(projects::configure())
        .merge(conversion::configure())
        .route("/api/crm/stages", get(catalog::stage_catalogs))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
