//! snapembed server entry point.
//!
//! Loads configuration, opens the image cache, and serves the HTTP API until
//! Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use axum::http::Request;
use snapembed_client::{FetchClient, FetchConfig, PageFetcher};
use snapembed_core::{AppConfig, CacheDb, RenderCache};
use snapembed_server::{AppState, SnapshotService, renderer_from_config, router, spawn_purge_task};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::load()?;

    let db = CacheDb::open(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), images = db.image_count().await?, "opened image cache");

    let fetcher: Arc<dyn PageFetcher> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let renderer = renderer_from_config(&config);
    let render_enabled = renderer.is_some();
    let cache = RenderCache::from_config(Arc::new(db.clone()), &config);
    let service = SnapshotService::new(fetcher, renderer, cache, config.max_bytes);

    if let Some(every) = config.purge_interval() {
        spawn_purge_task(db, every);
    }

    let app = router(AppState::new(service))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            tracing::span!(Level::INFO, "http_request", method = %request.method(), path = %request.uri().path())
        }))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, render_enabled, "starting snapembed server");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
