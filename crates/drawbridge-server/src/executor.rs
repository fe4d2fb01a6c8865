//! Executor WebSocket lifecycle on the data port.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use drawbridge_core::protocol::ReplyFrame;

use crate::state::ServerState;

/// The data-port router. Plugins connect to the root path; `/ws` is accepted
/// as an alias.
pub fn data_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_executor_connection(state, socket))
}

/// One executor connection: register as the current socket, forward pushed
/// invocations, and route every incoming reply into the relay's settle path.
/// All exit paths funnel through the same `socket_closed` teardown.
pub async fn handle_executor_connection(state: Arc<ServerState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "Canvas executor connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let generation = state.relay.register_socket(tx).await;

    // Writer task: relay pushes land here as pre-encoded frames.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut close_reason = "connection closed".to_string();
    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let text = text.to_string();
                match serde_json::from_str::<ReplyFrame>(&text) {
                    Ok(reply) => state.relay.deliver_reply(reply).await,
                    Err(e) => {
                        warn!(conn_id = %conn_id, %e, "Ignoring malformed executor message");
                    }
                }
            }
            Ok(Message::Close(_)) => {
                close_reason = "executor closed the socket".into();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                close_reason = format!("socket error: {e}");
                break;
            }
        }
    }

    send_task.abort();
    // Stale generations are discarded inside the relay, so a connection that
    // was already replaced cannot flush its successor's pendings.
    state.relay.socket_closed(generation, &close_reason).await;
    info!(conn_id = %conn_id, close_reason = %close_reason, "Canvas executor disconnected");
}
