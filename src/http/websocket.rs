//! WebSocket client handling.
//!
//! # Responsibilities
//! - Complete upgrade handshake with client
//! - Report connect/disconnect to the counter coordinator
//! - Push every fanned-out count to the client
//!
//! # Data Flow
//! ```text
//! Client ←──── {"event": ..., "data": {"count": N}} ──── LocalBroadcaster
//!   │
//!   └── open/close ──→ CounterCoordinator (INCR/DECR + publish)
//! ```
//!
//! # Design Decisions
//! - Subscribe to fan-out before registering, so the client sees its own connect
//! - Every counted session reports its disconnect; after shutdown
//!   reconciliation seals the count, the coordinator leaves the store alone
//! - Inbound client frames are ignored

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::counter::{CounterError, FanoutMessage};
use crate::http::server::AppState;

/// Why a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    ClientGone,
    ServerShutdown,
}

/// JSON text frame sent to clients for one count update.
pub fn client_frame(message: &FanoutMessage) -> String {
    serde_json::json!({
        "event": message.channel,
        "data": { "count": message.event.value },
    })
    .to_string()
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.lifecycle.accepting() {
        tracing::debug!(state = %state.lifecycle.state(), "Refusing client while not running");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is not accepting clients").into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let mut updates = state.broadcaster.subscribe();
    let mut shutdown = state.shutdown.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let registered = match state.coordinator.on_local_connect().await {
        Ok(value) => {
            tracing::debug!(client_id = %client_id, value, "Client registered");
            true
        }
        Err(e) if e.mutation_applied() => {
            tracing::warn!(client_id = %client_id, error = %e, "Client counted but change event was not published");
            true
        }
        Err(CounterError::Draining) => {
            tracing::debug!(client_id = %client_id, "Server draining; closing uncounted client");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            tracing::error!(client_id = %client_id, error = %e, "Failed to count client; closing connection");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let end = loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(message) => {
                    if let Err(e) = sender.send(Message::Text(client_frame(&message).into())).await {
                        tracing::debug!(client_id = %client_id, error = %e, "Send failed; dropping client");
                        break SessionEnd::ClientGone;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(client_id = %client_id, skipped, "Client lagging; skipped stale counts");
                }
                Err(RecvError::Closed) => break SessionEnd::ServerShutdown,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break SessionEnd::ClientGone,
                Some(Err(e)) => {
                    tracing::debug!(client_id = %client_id, error = %e, "Client socket error");
                    break SessionEnd::ClientGone;
                }
                Some(Ok(_)) => {}
            },
            _ = shutdown.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break SessionEnd::ServerShutdown;
            }
        }
    };

    tracing::debug!(client_id = %client_id, end = ?end, "Client session closed");
    if registered {
        if let Err(e) = state.coordinator.on_local_disconnect().await {
            tracing::error!(client_id = %client_id, error = %e, "Failed to record disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ChangeEvent;

    #[test]
    fn test_client_frame() {
        let frame = client_frame(&FanoutMessage {
            channel: "chat:connection-count-updated".into(),
            event: ChangeEvent::new(12),
        });
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["event"], "chat:connection-count-updated");
        assert_eq!(json["data"]["count"], 12);
    }
}
