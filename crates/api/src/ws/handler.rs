use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use taskcast_core::types::OwnerId;
use taskcast_events::ConnectionRegistry;

use crate::state::AppState;

/// Application-level keepalive: a client text frame `ping` is answered with `pong`.
const CLIENT_PING: &str = "ping";
const SERVER_PONG: &str = "pong";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub owner_id: OwnerId,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered under `owner_id` and
/// served by a sender task plus the receive loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.owner_id, state.connections))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the registry.
///   2. Spawns a sender task that forwards registry messages to the socket.
///   3. Processes inbound frames on the current task.
///   4. Deregisters on close or error.
async fn handle_socket(socket: WebSocket, owner_id: OwnerId, connections: Arc<ConnectionRegistry>) {
    let (conn_id, mut rx) = connections.connect_channel(owner_id).await;
    tracing::info!(owner_id, conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    // Sender task: the only writer to the sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                text = rx.recv() => match text {
                    Some(text) => Message::Text(text.into()),
                    None => {
                        // Registry dropped the connection (shutdown).
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                Some(()) = pong_rx.recv() => Message::Text(SERVER_PONG.into()),
            };
            if sink.send(frame).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) if text.as_str() == CLIENT_PING => {
                if pong_tx.send(()).is_err() {
                    break;
                }
            }
            Ok(_msg) => {
                tracing::trace!(conn_id = %conn_id, "Ignoring inbound frame");
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    connections.disconnect(owner_id, &conn_id).await;
    send_task.abort();
    tracing::info!(owner_id, conn_id = %conn_id, "WebSocket disconnected");
}
