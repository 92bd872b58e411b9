//! WebSocket endpoint: the persistent bidirectional client channel.
//!
//! Each connection gets two halves: a writer task draining the
//! connection's outbound event queue into JSON text frames, and a read
//! loop parsing inbound frames into [`ClientEvent`]s for the core to
//! dispatch. A malformed frame earns an `error` event; it never closes
//! the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use palaver_shared::protocol::{ClientEvent, ServerEvent};

use crate::api::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = state.core.connect(tx).await;
    info!(conn = %conn, "websocket connected");

    // Writer task: serialize outbound events into text frames.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                // Peer went away; the read loop observes the close.
                break;
            }
        }
    });

    // Read loop: parse inbound frames and dispatch them.
    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(conn = %conn, error = %e, "websocket receive error");
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.core.handle(conn, event).await,
                Err(e) => {
                    debug!(conn = %conn, error = %e, "malformed client event");
                    state
                        .core
                        .report_error(conn, format!("malformed event: {e}"))
                        .await;
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    // The implicit disconnect event: presence flips and typing timers
    // are released before the connection is forgotten.
    state.core.disconnect(conn).await;
    writer.abort();
    info!(conn = %conn, "websocket disconnected");
}
