//! HTTP server implementation using Axum.

use crate::handlers::{handle_events, handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use modsync_core::ModSync;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Concurrent `/rpc` requests served at once.
const MAX_CONCURRENT_RPC: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: ModSync,
}

/// Build the router: `/rpc`, `/health` and the `/events` stream.
pub fn router(engine: ModSync) -> Router {
    let state = Arc::new(AppState { engine });

    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/rpc",
            post(handle_rpc).layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_RPC)),
        )
        .route("/events", get(handle_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(engine: ModSync, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(engine);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
