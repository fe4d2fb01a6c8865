//! Deterministic rule-based planner.
//!
//! Inspects the message (plus optional context/profile strings) for keyword
//! cues, picks a fixed composition recipe, and issues its call sequence one
//! at a time so later calls can reference node ids returned by earlier ones.
//! A failed call is recorded and the sequence continues; partial success is
//! a normal, reportable outcome.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use drawbridge_core::protocol::ExecutedToolCall;
use drawbridge_core::Result;
use drawbridge_relay::Relay;

use crate::{ensure_executor_ready, PlanOutcome, PlanRequest, Planner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recipe {
    /// A labeled call-to-action section: frame, button, label, heading.
    CallToAction,
    /// A multi-panel application shell: root, sidebar, header, content.
    AppShell,
    /// Fallback: a generic labeled canvas.
    LabeledCanvas,
}

const CTA_KEYWORDS: &[&str] = &["button", "cta", "hero", "signup", "banner"];
const SHELL_KEYWORDS: &[&str] = &["app", "application", "dashboard", "shell", "admin", "sidebar"];

pub struct LocalPlanner;

#[async_trait]
impl Planner for LocalPlanner {
    fn id(&self) -> &str {
        "local"
    }

    async fn plan(&self, relay: &Relay, request: &PlanRequest) -> Result<PlanOutcome> {
        ensure_executor_ready(relay).await?;

        let recipe = select_recipe(request);
        let label = quoted_label(&request.message).unwrap_or_else(|| default_label(recipe));
        debug!(?recipe, %label, "Local planner selected recipe");

        let mut audit = Vec::new();
        match recipe {
            Recipe::CallToAction => build_call_to_action(relay, &label, &mut audit).await,
            Recipe::AppShell => build_app_shell(relay, &label, &mut audit).await,
            Recipe::LabeledCanvas => build_labeled_canvas(relay, &label, &mut audit).await,
        }

        Ok(PlanOutcome {
            assistant: summarize(recipe, &audit),
            tool_calls: audit,
        })
    }
}

/// Keyword scan across message + context + profile.
fn select_recipe(request: &PlanRequest) -> Recipe {
    let mut words: Vec<String> = Vec::new();
    for source in [
        Some(request.message.as_str()),
        request.context.as_deref(),
        request.profile.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        words.extend(
            source
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(|w| w.to_lowercase()),
        );
    }

    if words.iter().any(|w| CTA_KEYWORDS.contains(&w.as_str())) {
        Recipe::CallToAction
    } else if words.iter().any(|w| SHELL_KEYWORDS.contains(&w.as_str())) {
        Recipe::AppShell
    } else {
        Recipe::LabeledCanvas
    }
}

/// First double-quoted substring of the message, if any.
fn quoted_label(message: &str) -> Option<String> {
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    let label = rest[..end].trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn default_label(recipe: Recipe) -> String {
    match recipe {
        Recipe::CallToAction => "Get Started".into(),
        Recipe::AppShell => "My App".into(),
        Recipe::LabeledCanvas => "Untitled".into(),
    }
}

/// Issue one call, record its outcome, and hand back the result on success.
async fn call(
    relay: &Relay,
    audit: &mut Vec<ExecutedToolCall>,
    tool: &str,
    params: Value,
) -> Option<Value> {
    match relay.dispatch(tool, params.clone()).await {
        Ok(result) => {
            audit.push(ExecutedToolCall::success(tool, params, result.clone()));
            Some(result)
        }
        Err(e) => {
            debug!(tool, %e, "Recipe call failed, continuing");
            audit.push(ExecutedToolCall::failure(tool, params, e.to_string()));
            None
        }
    }
}

/// Created-node id from an executor result.
fn node_id(result: &Value) -> Option<String> {
    result
        .get("id")
        .or_else(|| result.get("nodeId"))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Attach `parentId` when the parent call produced an id.
fn with_parent(mut params: Value, parent: &Option<String>) -> Value {
    if let Some(id) = parent {
        params["parentId"] = json!(id);
    }
    params
}

async fn build_call_to_action(relay: &Relay, label: &str, audit: &mut Vec<ExecutedToolCall>) {
    let frame = call(
        relay,
        audit,
        "create_frame",
        json!({ "name": "CTA Section", "x": 0, "y": 0, "width": 960, "height": 480 }),
    )
    .await
    .as_ref()
    .and_then(node_id);

    let heading = format!("{label} today");
    call(
        relay,
        audit,
        "create_text",
        with_parent(
            json!({ "name": "Heading", "x": 80, "y": 96, "text": heading, "fontSize": 40, "fontWeight": 700 }),
            &frame,
        ),
    )
    .await;

    let button = call(
        relay,
        audit,
        "create_rectangle",
        with_parent(
            json!({ "name": "Button", "x": 80, "y": 320, "width": 240, "height": 64 }),
            &frame,
        ),
    )
    .await
    .as_ref()
    .and_then(node_id);

    if let Some(id) = &button {
        call(
            relay,
            audit,
            "set_fill_color",
            json!({ "nodeId": id, "r": 0.12, "g": 0.45, "b": 0.95 }),
        )
        .await;
        call(
            relay,
            audit,
            "set_corner_radius",
            json!({ "nodeId": id, "radius": 12 }),
        )
        .await;
    }

    call(
        relay,
        audit,
        "create_text",
        with_parent(
            json!({ "name": "Button Label", "x": 104, "y": 340, "text": label, "fontSize": 20, "fontWeight": 600,
                    "fontColor": { "r": 1, "g": 1, "b": 1 } }),
            &button.or(frame),
        ),
    )
    .await;
}

async fn build_app_shell(relay: &Relay, label: &str, audit: &mut Vec<ExecutedToolCall>) {
    let root = call(
        relay,
        audit,
        "create_frame",
        json!({ "name": "App Shell", "x": 0, "y": 0, "width": 1440, "height": 900 }),
    )
    .await
    .as_ref()
    .and_then(node_id);

    let sidebar = call(
        relay,
        audit,
        "create_frame",
        with_parent(
            json!({ "name": "Sidebar", "x": 0, "y": 0, "width": 240, "height": 900 }),
            &root,
        ),
    )
    .await
    .as_ref()
    .and_then(node_id);

    let header = call(
        relay,
        audit,
        "create_frame",
        with_parent(
            json!({ "name": "Header", "x": 240, "y": 0, "width": 1200, "height": 72 }),
            &root,
        ),
    )
    .await
    .as_ref()
    .and_then(node_id);

    call(
        relay,
        audit,
        "create_frame",
        with_parent(
            json!({ "name": "Content", "x": 240, "y": 72, "width": 1200, "height": 828 }),
            &root,
        ),
    )
    .await;

    if let Some(id) = &sidebar {
        call(
            relay,
            audit,
            "set_fill_color",
            json!({ "nodeId": id, "r": 0.11, "g": 0.13, "b": 0.18 }),
        )
        .await;
    }

    call(
        relay,
        audit,
        "create_text",
        with_parent(
            json!({ "name": "App Title", "x": 264, "y": 22, "text": label, "fontSize": 20, "fontWeight": 600 }),
            &header.or(root),
        ),
    )
    .await;
}

async fn build_labeled_canvas(relay: &Relay, label: &str, audit: &mut Vec<ExecutedToolCall>) {
    let frame = call(
        relay,
        audit,
        "create_frame",
        json!({ "name": label, "x": 0, "y": 0, "width": 800, "height": 600 }),
    )
    .await
    .as_ref()
    .and_then(node_id);

    call(
        relay,
        audit,
        "create_text",
        with_parent(
            json!({ "name": "Label", "x": 40, "y": 40, "text": label, "fontSize": 32, "fontWeight": 700 }),
            &frame,
        ),
    )
    .await;
}

fn summarize(recipe: Recipe, audit: &[ExecutedToolCall]) -> String {
    let what = match recipe {
        Recipe::CallToAction => "a call-to-action section",
        Recipe::AppShell => "an application shell",
        Recipe::LabeledCanvas => "a labeled canvas",
    };
    let total = audit.len();
    let failed: Vec<&str> = audit
        .iter()
        .filter(|c| c.is_error())
        .map(|c| c.tool.as_str())
        .collect();

    if failed.is_empty() {
        format!("Created {what} ({total} calls succeeded).")
    } else {
        format!(
            "Created {what} with partial results: {} of {total} calls succeeded ({} failed).",
            total - failed.len(),
            failed.join(", ")
        )
    }
}
