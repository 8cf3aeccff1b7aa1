//! WebSocket handler for the local daemon.
//!
//! Each text message carries one bridge envelope and each router output is
//! sent back as one text message. Every connection gets its own router, so
//! instances never leak between connections.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::DaemonState;
use crate::router::BridgeRouter;

/// Upgrades `GET /` to a bridge connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DaemonState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: DaemonState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut outgoing) = mpsc::unbounded_channel::<Value>();
    let router = BridgeRouter::new(state.ctx.clone(), tx);

    // Dropping the guard closes the router's instances.
    let conn_guard = state.connections.register(router.clone());
    let cancel_token = conn_guard.cancel_token().clone();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => router.handle_value(value),
                    Err(e) => log::warn!("[WS] Skipping malformed message on {}: {}", conn_guard.id(), e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("[WS] Client closed: {}", conn_guard.id());
                    break;
                }
                Some(Ok(Message::Binary(_))) => {
                    log::warn!("[WS] Binary message on {} ignored", conn_guard.id());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("[WS] Receive error on {}: {}", conn_guard.id(), e);
                    break;
                }
            },
            Some(value) = outgoing.recv() => {
                if sender.send(Message::Text(value.to_string().into())).await.is_err() {
                    log::debug!("[WS] Send failed on {}; closing", conn_guard.id());
                    break;
                }
            }
        }
    }
}
