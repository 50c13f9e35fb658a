//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // API routes
        .route("/api/topology", get(api::get_topology))
        .route("/api/topology/text", get(api::get_topology_text))
        .route("/api/network", get(api::get_network))
        .route("/api/nodes", get(api::list_nodes))
        .route("/api/nodes/{address}", get(api::get_node))
        .route("/api/devices", get(api::list_devices))
        .route("/api/status", get(api::get_status))
        .route("/api/refresh", post(api::refresh))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the poll scheduler and the web server until shutdown
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state.clone());

    let poller = state.poller.clone();
    let scheduler = tokio::spawn(async move { poller.run().await });

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // The server may also stop on its own, so make sure the scheduler follows
    state.shutdown.cancel();
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Poll scheduler task failed");
    }
    info!("Server stopped");
    Ok(())
}
