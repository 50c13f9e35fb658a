//! REST API handlers

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use meshmap_core::render::render_view;
use meshmap_core::status::{node_statuses, NetworkOverview, NodeStatus};
use meshmap_core::{ExtAddress, NetworkSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::poller::CycleOutcome;
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::new(msg))).into_response()
}

fn no_snapshot() -> Response {
    error(StatusCode::SERVICE_UNAVAILABLE, "No topology available yet")
}

fn current(state: &AppState) -> Result<Arc<NetworkSnapshot>, Response> {
    state.store.snapshot().ok_or_else(no_snapshot)
}

/// Snapshot and health
pub async fn get_topology(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.view())
}

/// Rendered markdown summary
pub async fn get_topology_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let text = render_view(&state.store.view());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        text,
    )
}

/// Network overview
pub async fn get_network(State(state): State<Arc<AppState>>) -> Response {
    let view = state.store.view();
    match &view.snapshot {
        Some(snapshot) => Json(NetworkOverview::new(snapshot, view.health.clone())).into_response(),
        None => no_snapshot(),
    }
}

/// Status of every node
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Response {
    match current(&state) {
        Ok(snapshot) => Json(node_statuses(&snapshot)).into_response(),
        Err(response) => response,
    }
}

/// Status of one node
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Response {
    let address: ExtAddress = match address.parse() {
        Ok(a) => a,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let snapshot = match current(&state) {
        Ok(s) => s,
        Err(response) => return response,
    };
    match NodeStatus::new(&snapshot, &address) {
        Some(status) => Json(status).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("Node {} not found", address)),
    }
}

/// Registry devices grouped by transport
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Response {
    match current(&state) {
        Ok(snapshot) => Json(snapshot.partition.clone()).into_response(),
        Err(response) => response,
    }
}

/// Store health
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.health())
}

/// Run a poll cycle now
pub async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    info!("Manual refresh requested");
    match state.poller.run_once().await {
        CycleOutcome::Published(snapshot) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "published", "cycle": snapshot.cycle})),
        )
            .into_response(),
        CycleOutcome::Failed(failure) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"status": "failed", "failure": failure})),
        )
            .into_response(),
        CycleOutcome::Skipped => error(StatusCode::CONFLICT, "A poll cycle is already running"),
        CycleOutcome::Cancelled => error(StatusCode::SERVICE_UNAVAILABLE, "Shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::poller::tests::payload;
    use axum::body::to_bytes;
    use chrono::Utc;
    use meshmap_core::{parse, EngineSettings};

    fn state() -> Arc<AppState> {
        let mut config = Config::default();
        config.otbr.url = Some("http://127.0.0.1:9".to_string());
        AppState::new(config).unwrap()
    }

    fn publish(state: &AppState) {
        let parsed = parse(&payload()).unwrap();
        let snapshot = NetworkSnapshot::build(parsed, &[], &EngineSettings::default(), 1, Utc::now());
        state.store.publish(snapshot);
    }

    async fn body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let state = state();
        assert_eq!(
            list_nodes(State(state.clone())).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let status = get_status(State(state)).await.into_response();
        assert_eq!(body(status).await["availability"], "pending");
    }

    #[tokio::test]
    async fn test_node_lookup() {
        let state = state();
        publish(&state);

        let found = get_node(State(state.clone()), Path("000000000000000B".to_string())).await;
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(body(found).await["role"], "router");

        let missing = get_node(State(state.clone()), Path("FFFFFFFFFFFFFFFF".to_string())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = get_node(State(state), Path("xyz".to_string())).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_network_and_text() {
        let state = state();
        publish(&state);

        let network = body(get_network(State(state.clone())).await).await;
        assert_eq!(network["network_name"], "home");
        assert_eq!(network["routers"], 1);

        let text = get_topology_text(State(state)).await.into_response();
        assert_eq!(
            text.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        let bytes = to_bytes(text.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(bytes.to_vec()).unwrap().contains("Thread Network: home"));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_snapshot() {
        let state = state();
        publish(&state);

        // Nothing listens on the discard port
        let response = refresh(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body(response).await["failure"]["kind"], "transport");

        let topology = body(get_topology(State(state)).await.into_response()).await;
        assert_eq!(topology["snapshot"]["cycle"], 1);
        assert_eq!(topology["health"]["availability"], "stale");
    }
}
