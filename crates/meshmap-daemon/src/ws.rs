//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use meshmap_core::{FailureKind, StoreView};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::poller::PollEvent;
use crate::state::AppState;

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    /// Full view, sent once on connect
    #[serde(rename = "topology")]
    Topology(Arc<StoreView>),
    #[serde(rename = "snapshot_updated")]
    SnapshotUpdated {
        cycle: u64,
        nodes: usize,
        links: usize,
        conflicts: usize,
    },
    #[serde(rename = "cycle_failed")]
    CycleFailed {
        cycle: u64,
        kind: FailureKind,
        message: String,
        consecutive_failures: u32,
    },
    #[serde(rename = "pong")]
    Pong,
}

impl From<PollEvent> for WsMessage {
    fn from(event: PollEvent) -> Self {
        match event {
            PollEvent::SnapshotUpdated {
                cycle,
                nodes,
                links,
                conflicts,
            } => WsMessage::SnapshotUpdated {
                cycle,
                nodes,
                links,
                conflicts,
            },
            PollEvent::CycleFailed {
                cycle,
                kind,
                message,
                consecutive_failures,
            } => WsMessage::CycleFailed {
                cycle,
                kind,
                message,
                consecutive_failures,
            },
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send<S>(sender: &mut S, msg: &WsMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.poller.subscribe();

    info!("WebSocket client connected");

    if !send(&mut sender, &WsMessage::Topology(state.store.view())).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !send(&mut sender, &event.into()).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Poll event channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" && !send(&mut sender, &WsMessage::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let msg: WsMessage = PollEvent::CycleFailed {
            cycle: 4,
            kind: FailureKind::Transport,
            message: "timed out".to_string(),
            consecutive_failures: 2,
        }
        .into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cycle_failed");
        assert_eq!(json["data"]["kind"], "transport");
        assert_eq!(json["data"]["consecutive_failures"], 2);

        let pong = serde_json::to_value(&WsMessage::Pong).unwrap();
        assert_eq!(pong["type"], "pong");
    }
}
