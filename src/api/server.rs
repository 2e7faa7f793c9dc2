use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{get_progress, health, submit_download},
    state::AppState,
};
use crate::config::Config;
use crate::fetcher::browser::BrowserFetcher;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(address: SocketAddr) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;

    let fetcher = BrowserFetcher::new(config.fetch.fetcher_config())
        .map_err(|e| format!("Failed to build fetcher: {}", e))?;

    let state = AppState::new(config, Arc::new(fetcher));
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "drivefetch API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Routes plus middleware; shared with the integration tests.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/downloads", post(submit_download))
        .route("/downloads/progress/{session_id}", get(get_progress))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip/deflate/brotli request bodies
        .layer(RequestDecompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
