//! Relay wire frames and chat API types.
//!
//! The same invocation/reply shapes travel over both executor transports:
//! pushed as JSON text on the data socket, or returned from `GET /poll` and
//! accepted by `POST /result` on the control surface.

use serde::{Deserialize, Serialize};

/// A tool invocation pushed to the canvas executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationFrame {
    pub id: String,
    pub tool: String,
    pub params: serde_json::Value,
}

/// A reply from the executor, over either transport.
///
/// Exactly one of `result` / `error` is expected; a reply carrying neither is
/// treated as an empty success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One turn of caller-retained conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Audit record for one tool invocation issued during a chat turn.
/// Append-only: never mutated after the call settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedToolCall {
    pub tool: String,
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutedToolCall {
    pub fn success(tool: impl Into<String>, params: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            params,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool: impl Into<String>, params: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// `POST /chat` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    /// Optional free-text context the panel passes through to the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Optional free-text profile (brand voice, preferences).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn default_provider() -> String {
    "local".into()
}

/// `POST /chat` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub assistant: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "toolCalls")]
    pub tool_calls: Vec<ExecutedToolCall>,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(rename = "controlPort")]
    pub control_port: u16,
    #[serde(rename = "dataPort")]
    pub data_port: u16,
    #[serde(rename = "executorConnected")]
    pub executor_connected: bool,
}

/// `POST /prompt` body — free-text handoff from the canvas side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub text: String,
}
