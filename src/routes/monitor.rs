//! # routes::monitor
//!
//! **Live alert stream** for the dashboard.
//!
//! | Method    | Path         | Description                          |
//! |-----------|--------------|--------------------------------------|
//! | GET (WS)  | `/ws/alerts` | Snapshot on connect, then every [`AlertEvent`](crate::events::AlertEvent) |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

/// Upgrade HTTP → WebSocket and relay the event bus.
pub async fn ws_alerts(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    // Subscribe before the snapshot so nothing falls in between.
    let mut rx = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!(clients = state.events.subscriber_count(), "🔌 Alert stream client connected");

    let snapshot = {
        let status = state.monitor.status().await;
        let alerts = state.dispatcher.alerts_snapshot(false).await;

        json!({
            "event":  "SNAPSHOT",
            "status": status,
            "alerts": alerts,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("Alert stream client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 Alert stream client disconnected");
}
