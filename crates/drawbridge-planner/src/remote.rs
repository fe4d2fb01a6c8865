//! Remote-model planner: bounded function-calling loop against a completion
//! endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use drawbridge_core::protocol::{ExecutedToolCall, Role};
use drawbridge_core::Result;
use drawbridge_relay::Relay;
use drawbridge_tools::ToolCatalog;

use crate::responses::{ResponsesClient, ResponsesRequest};
use crate::{ensure_executor_ready, PlanOutcome, PlanRequest, Planner, MAX_HISTORY_TURNS};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

const INSTRUCTIONS: &str = "You are a design assistant operating a live canvas through tools. \
Use the provided tools to create and style nodes; child nodes must reference the parentId \
returned by their container's creation call. Keep layouts simple and aligned. When the \
design is complete, reply with a short summary instead of calling more tools.";

pub struct RemotePlanner {
    client: ResponsesClient,
    model: String,
    max_rounds: u32,
    tools: Vec<Value>,
}

impl RemotePlanner {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        max_rounds: u32,
        catalog: &ToolCatalog,
    ) -> Self {
        Self {
            client: ResponsesClient::new(api_key, base_url),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_rounds,
            tools: catalog.to_function_tools(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Planner for RemotePlanner {
    fn id(&self) -> &str {
        "openai"
    }

    async fn plan(&self, relay: &Relay, request: &PlanRequest) -> Result<PlanOutcome> {
        ensure_executor_ready(relay).await?;

        let mut audit: Vec<ExecutedToolCall> = Vec::new();
        let mut final_text = String::new();
        let mut input = initial_input(request);
        let mut previous_response_id: Option<String> = None;

        for round in 0..self.max_rounds {
            let payload = self
                .client
                .create(&ResponsesRequest {
                    model: self.model.clone(),
                    input,
                    instructions: Some(INSTRUCTIONS.to_string()),
                    tools: Some(self.tools.clone()),
                    previous_response_id: previous_response_id.clone(),
                })
                .await?;

            let text = payload.text();
            if !text.is_empty() {
                final_text = text;
            }

            let calls = payload.requested_calls();
            if calls.is_empty() {
                debug!(round, "Planner finished without further calls");
                return Ok(PlanOutcome {
                    assistant: final_text,
                    tool_calls: audit,
                });
            }

            // Execute sequentially; each outcome flows back as a
            // function_call_output item linked to the prior response.
            let mut outputs = Vec::with_capacity(calls.len());
            for requested in calls {
                let params: Value =
                    serde_json::from_str(&requested.arguments).unwrap_or_else(|_| json!({}));

                let output = match relay.dispatch(&requested.name, params.clone()).await {
                    Ok(result) => {
                        audit.push(ExecutedToolCall::success(
                            &requested.name,
                            params,
                            result.clone(),
                        ));
                        result.to_string()
                    }
                    Err(e) => {
                        audit.push(ExecutedToolCall::failure(
                            &requested.name,
                            params,
                            e.to_string(),
                        ));
                        json!({ "error": e.to_string() }).to_string()
                    }
                };

                outputs.push(json!({
                    "type": "function_call_output",
                    "call_id": requested.call_id,
                    "output": output,
                }));
            }

            previous_response_id = Some(payload.id);
            input = Value::Array(outputs);
        }

        warn!(
            rounds = self.max_rounds,
            "Planner hit the round cap; returning accumulated result"
        );
        Ok(PlanOutcome {
            assistant: final_text,
            tool_calls: audit,
        })
    }
}

/// First-round input: optional context/profile, bounded history, then the
/// user message.
fn initial_input(request: &PlanRequest) -> Value {
    let mut items = Vec::new();

    let mut ambient = String::new();
    if let Some(context) = &request.context {
        ambient.push_str(&format!("Canvas context: {context}\n"));
    }
    if let Some(profile) = &request.profile {
        ambient.push_str(&format!("Design profile: {profile}\n"));
    }
    if !ambient.is_empty() {
        items.push(json!({ "role": "system", "content": ambient.trim_end() }));
    }

    let start = request.conversation.len().saturating_sub(MAX_HISTORY_TURNS);
    for turn in &request.conversation[start..] {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        items.push(json!({ "role": role, "content": turn.content }));
    }

    items.push(json!({ "role": "user", "content": request.message }));
    Value::Array(items)
}
