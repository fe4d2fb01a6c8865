//! stdio tool surface: line-delimited JSON-RPC 2.0.
//!
//! Exposes the drawing-tool registry to a stdio-based tool-calling client.
//! `tools/call` dispatches through the relay, except for the
//! `get_and_clear_last_canvas_message` entry which is answered locally from
//! the handoff slot. Logging must go to stderr while this surface runs;
//! stdout carries the protocol.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use drawbridge_tools::CANVAS_MESSAGE_TOOL;

use crate::state::ServerState;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Read requests from stdin until EOF.
pub async fn run_stdio_surface(state: Arc<ServerState>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(response) = handle_line(&state, line).await else {
            continue; // notification
        };
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("stdio client disconnected");
    Ok(())
}

/// Handle one request line. Returns `None` for notifications (no id).
async fn handle_line(state: &ServerState, line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(rpc_error(
                Value::Null,
                PARSE_ERROR,
                format!("invalid JSON: {e}"),
            ));
        }
    };

    let id = request.get("id").cloned()?;
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
    debug!(method, "stdio request");

    match method {
        "initialize" => Some(rpc_result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "drawbridge",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }),
        )),
        "ping" => Some(rpc_result(id, json!({}))),
        "tools/list" => Some(rpc_result(
            id,
            json!({ "tools": state.catalog.to_registry_entries() }),
        )),
        "tools/call" => Some(match handle_tool_call(state, params).await {
            Ok(result) => rpc_result(id, result),
            Err((code, message)) => rpc_error(id, code, message),
        }),
        other => Some(rpc_error(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        )),
    }
}

/// Invoke one registry entry. Invocation-level failures (unknown tool, no
/// executor, timeout, executor error) are reported as tool results with
/// `isError`, not protocol errors, so the client can show them to the model.
async fn handle_tool_call(
    state: &ServerState,
    params: Value,
) -> std::result::Result<Value, (i64, String)> {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Err((INVALID_PARAMS, "missing tool name".into()));
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    if name == CANVAS_MESSAGE_TOOL {
        let text = state
            .take_canvas_message()
            .await
            .unwrap_or_else(|| "No canvas message waiting.".into());
        return Ok(tool_text(text, false));
    }

    if state.catalog.get(name).is_none() {
        return Ok(tool_text(format!("Unknown tool: {name}"), true));
    }

    if !state.relay.executor_ready().await {
        return Ok(tool_text(
            "No canvas executor connected; open the canvas plugin and retry.",
            true,
        ));
    }

    match state.relay.dispatch(name, arguments).await {
        Ok(result) => {
            let rendered =
                serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
            Ok(tool_text(rendered, false))
        }
        Err(e) => Ok(tool_text(format!("Tool error: {e}"), true)),
    }
}

fn tool_text(text: impl Into<String>, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }],
        "isError": is_error,
    })
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Value, code: i64, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::PortBinding;
    use drawbridge_core::config::Config;
    use drawbridge_core::protocol::{InvocationFrame, ReplyFrame};
    use drawbridge_relay::Relay;
    use drawbridge_tools::ToolCatalog;
    use tokio::sync::mpsc;

    fn test_state() -> Arc<ServerState> {
        Arc::new(ServerState::new(
            Arc::new(Config::default()),
            Arc::new(Relay::new()),
            Arc::new(ToolCatalog::new()),
            PortBinding {
                control_port: 3056,
                data_port: 3055,
                attempt: 1,
            },
        ))
    }

    async fn attach_fake_executor(state: &Arc<ServerState>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        state.relay.register_socket(tx).await;
        let relay = state.relay.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let frame: InvocationFrame = serde_json::from_str(&msg).unwrap();
                relay
                    .deliver_reply(ReplyFrame {
                        id: frame.id,
                        result: Some(json!({ "id": "1:42" })),
                        error: None,
                    })
                    .await;
            }
        });
    }

    #[tokio::test]
    async fn test_tools_list_exposes_registry() {
        let state = test_state();
        let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(!tools.is_empty());
        assert!(tools.iter().any(|t| t["name"] == CANVAS_MESSAGE_TOOL));
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tool_call_relays_to_executor() {
        let state = test_state();
        attach_fake_executor(&state).await;

        let line = r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"create_frame","arguments":{"x":0,"y":0,"width":100,"height":80}}}"#;
        let response = handle_line(&state, line).await.unwrap();

        assert_eq!(response["result"]["isError"], false);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("1:42"));
    }

    #[tokio::test]
    async fn test_tool_call_without_executor_is_tool_error() {
        let state = test_state();
        let line = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_selection","arguments":{}}}"#;
        let response = handle_line(&state, line).await.unwrap();
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_handoff_tool_reads_and_clears() {
        let state = test_state();
        state.set_canvas_message("align the cards".into()).await;

        let line = format!(
            r#"{{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{{"name":"{CANVAS_MESSAGE_TOOL}","arguments":{{}}}}}}"#
        );
        let response = handle_line(&state, &line).await.unwrap();
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(text, "align the cards");

        // The slot is cleared; a second call reports nothing waiting.
        let response = handle_line(&state, &line).await.unwrap();
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("No canvas message"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_notifications() {
        let state = test_state();
        let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        // No id: notification, no response.
        let none = handle_line(
            &state,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_response() {
        let state = test_state();
        let response = handle_line(&state, "not json at all").await.unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
    }
}
