//! Server integration tests — boot a real relay and interact via HTTP + WS.
//!
//! Run with: `cargo test -p drawbridge-server --test integration`

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use drawbridge_core::config::Config;
use drawbridge_core::protocol::{InvocationFrame, ReplyFrame};
use drawbridge_relay::Relay;
use drawbridge_server::{start_server, PortNegotiator, ServerState};
use drawbridge_tools::ToolCatalog;

/// Find a base port P where both P and P-1 are currently free.
fn free_pair_base() -> u16 {
    loop {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        if port < 3 {
            continue;
        }
        if let Ok(lower) = std::net::TcpListener::bind(("127.0.0.1", port - 1)) {
            drop(lower);
            drop(probe);
            return port;
        }
    }
}

/// Negotiate a pair, start the server, and wait for readiness.
async fn start_test_server() -> (Arc<ServerState>, u16, u16) {
    let base = free_pair_base();
    let mut negotiator = PortNegotiator::new("127.0.0.1");
    let listeners = negotiator
        .negotiate(base, base.saturating_add(40))
        .await
        .expect("negotiation failed");
    let binding = listeners.binding;

    let state = Arc::new(ServerState::new(
        Arc::new(Config::default()),
        Arc::new(Relay::with_timeout(Duration::from_secs(2))),
        Arc::new(ToolCatalog::new()),
        binding,
    ));

    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = start_server(server_state, listeners).await;
    });

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if reqwest::get(format!("http://127.0.0.1:{}/health", binding.control_port))
            .await
            .is_ok()
        {
            break;
        }
    }

    (state, binding.control_port, binding.data_port)
}

/// Connect a WS executor that answers every invocation with `{"id":"node-N"}`.
async fn attach_ws_executor(data_port: u16) {
    let url = format!("ws://127.0.0.1:{data_port}/");
    let (ws, _) = connect_async(&url).await.expect("WS connect failed");
    let (mut ws_tx, mut ws_rx) = ws.split();

    tokio::spawn(async move {
        let mut counter = 0u32;
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                let frame: InvocationFrame = serde_json::from_str(text.as_str()).unwrap();
                counter += 1;
                let reply = ReplyFrame {
                    id: frame.id,
                    result: Some(json!({ "id": format!("node-{counter}") })),
                    error: None,
                };
                let encoded = serde_json::to_string(&reply).unwrap();
                if ws_tx.send(Message::Text(encoded.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Give the server a moment to register the socket.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_health_reports_port_pair() {
    let (_state, control_port, data_port) = start_test_server().await;

    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{control_port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(body["controlPort"], control_port);
    assert_eq!(body["dataPort"], data_port);
    assert_eq!(body["executorConnected"], false);
}

#[tokio::test]
async fn test_ws_executor_roundtrip() {
    let (state, control_port, data_port) = start_test_server().await;
    attach_ws_executor(data_port).await;

    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{control_port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["executorConnected"], true);

    let result = state
        .relay
        .dispatch("create_frame", json!({ "x": 0, "y": 0, "width": 10, "height": 10 }))
        .await
        .unwrap();
    assert_eq!(result["id"], "node-1");
}

#[tokio::test]
async fn test_poll_and_result_roundtrip() {
    let (state, control_port, _data_port) = start_test_server().await;

    let relay = state.relay.clone();
    let call =
        tokio::spawn(async move { relay.dispatch("get_selection", json!({})).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The queued invocation answers the poll immediately.
    let invocation: serde_json::Value =
        reqwest::get(format!("http://127.0.0.1:{control_port}/poll"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(invocation["tool"], "get_selection");
    let id = invocation["id"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/result"))
        .json(&json!({ "id": id, "result": { "selection": [] } }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let result = call.await.unwrap().unwrap();
    assert_eq!(result["selection"], json!([]));
}

#[tokio::test]
async fn test_second_concurrent_poll_conflicts() {
    let (state, control_port, _data_port) = start_test_server().await;

    // First poll parks with nothing queued.
    let first = tokio::spawn(async move {
        reqwest::get(format!("http://127.0.0.1:{control_port}/poll"))
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second poll is rejected, never silently displacing the first.
    let second = reqwest::get(format!("http://127.0.0.1:{control_port}/poll"))
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::CONFLICT);

    // Exactly one waiter (the first) receives the next invocation.
    let relay = state.relay.clone();
    tokio::spawn(async move { relay.dispatch("get_selection", json!({})).await });

    let invocation = first.await.unwrap();
    assert_eq!(invocation["tool"], "get_selection");
}

#[tokio::test]
async fn test_chat_local_planner_end_to_end() {
    let (_state, control_port, data_port) = start_test_server().await;
    attach_ws_executor(data_port).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/chat"))
        .json(&json!({
            "provider": "local",
            "message": "add a \"Go\" button to the page",
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["provider"], "local");
    let calls = body["toolCalls"].as_array().unwrap();
    assert!(!calls.is_empty());
    assert_eq!(calls[0]["tool"], "create_frame");
    assert!(body["assistant"].as_str().unwrap().contains("call-to-action"));
}

#[tokio::test]
async fn test_chat_rejections() {
    let (_state, control_port, _data_port) = start_test_server().await;
    let client = reqwest::Client::new();

    // No executor has ever connected: connectivity failure, fail fast.
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/chat"))
        .json(&json!({ "provider": "local", "message": "draw something" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    // Missing message.
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/chat"))
        .json(&json!({ "provider": "local", "message": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // Remote planner without credentials.
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/chat"))
        .json(&json!({ "provider": "openai", "message": "draw something" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // Unknown provider.
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/chat"))
        .json(&json!({ "provider": "mystery", "message": "draw something" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_prompt_handoff_slot() {
    let (state, control_port, _data_port) = start_test_server().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{control_port}/prompt"))
        .json(&json!({ "text": "make the header sticky" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    assert_eq!(
        state.take_canvas_message().await.as_deref(),
        Some("make the header sticky")
    );
    // Cleared by the read.
    assert_eq!(state.take_canvas_message().await, None);
}

#[tokio::test]
async fn test_executor_disconnect_flushes_pending_calls() {
    let (state, _control_port, data_port) = start_test_server().await;

    let url = format!("ws://127.0.0.1:{data_port}/");
    let (mut ws, _) = connect_async(&url).await.expect("WS connect failed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let relay = state.relay.clone();
    let call = tokio::spawn(async move { relay.dispatch("create_frame", json!({})).await });

    // Consume the pushed invocation, then drop the socket without replying.
    let _ = ws.next().await;
    ws.close(None).await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(
        matches!(err, drawbridge_core::DrawbridgeError::Connectivity(_)),
        "expected a prompt disconnect rejection, got {err:?}"
    );
}
