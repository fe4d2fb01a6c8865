//! Minimal client for an OpenAI-compatible Responses endpoint.
//!
//! Non-streaming: one POST per planner round. Follow-up rounds link to the
//! prior response via `previous_response_id` so the endpoint retains context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use drawbridge_core::{DrawbridgeError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct ResponsesClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePayload {
    pub id: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// One function call requested by the model.
#[derive(Debug, Clone)]
pub struct RequestedCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

impl ResponsePayload {
    /// Concatenated assistant text across all message items.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.output {
            if let OutputItem::Message { content } = item {
                for part in content {
                    if let ContentPart::OutputText { text } = part {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }

    pub fn requested_calls(&self) -> Vec<RequestedCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => Some(RequestedCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

impl ResponsesClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub async fn create(&self, request: &ResponsesRequest) -> Result<ResponsePayload> {
        debug!(model = %request.model, base_url = %self.base_url, "Requesting completion");

        let response = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| DrawbridgeError::Planner(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DrawbridgeError::Planner(format!(
                "completion endpoint returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DrawbridgeError::Planner(format!("malformed completion payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text_and_calls() {
        let raw = r#"{
            "id": "resp_1",
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "Placing the frame now." }
                ]},
                { "type": "function_call", "call_id": "call_1",
                  "name": "create_frame", "arguments": "{\"x\":0,\"y\":0,\"width\":100,\"height\":100}" }
            ]
        }"#;
        let payload: ResponsePayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.text(), "Placing the frame now.");
        let calls = payload.requested_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "create_frame");
        assert_eq!(calls[0].call_id, "call_1");
    }

    #[test]
    fn test_unknown_output_items_are_tolerated() {
        let raw = r#"{ "id": "resp_2", "output": [ { "type": "web_search_call" } ] }"#;
        let payload: ResponsePayload = serde_json::from_str(raw).unwrap();
        assert!(payload.text().is_empty());
        assert!(payload.requested_calls().is_empty());
    }

    #[test]
    fn test_request_skips_absent_fields() {
        let req = ResponsesRequest {
            model: "gpt-4.1-mini".into(),
            input: serde_json::json!([]),
            instructions: None,
            tools: None,
            previous_response_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("previous_response_id").is_none());
        assert!(v.get("tools").is_none());
    }
}
