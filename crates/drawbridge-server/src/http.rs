//! HTTP control surface: chat, health, long-poll, result, prompt.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use drawbridge_core::protocol::{
    ChatRequest, ChatResponse, HealthStatus, PromptRequest, ReplyFrame,
};
use drawbridge_core::DrawbridgeError;
use drawbridge_planner::{LocalPlanner, PlanRequest, Planner, RemotePlanner};
use drawbridge_relay::PollOutcome;

use crate::state::ServerState;

/// Build the control router. CORS is permissive: the canvas-host plugin runs
/// in a browser sandbox and long-polls cross-origin.
pub fn control_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/poll", get(poll_handler))
        .route("/result", post(result_handler))
        .route("/prompt", post(prompt_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthStatus {
        ok: true,
        control_port: state.binding.control_port,
        data_port: state.binding.data_port,
        executor_connected: state.relay.executor_connected().await,
    })
}

async fn chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }

    let (planner, resolved_model): (Box<dyn Planner>, Option<String>) =
        match request.provider.as_str() {
            "local" => (Box::new(LocalPlanner), None),
            "openai" => {
                let provider_config = state.config.provider("openai");
                let api_key = request
                    .api_key
                    .clone()
                    .or_else(|| provider_config.and_then(|p| p.resolve_api_key()));
                let Some(api_key) = api_key else {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "provider 'openai' requires an API key",
                    );
                };
                let base_url = provider_config.and_then(|p| p.base_url.clone());
                let model = request
                    .model
                    .clone()
                    .or_else(|| provider_config.and_then(|p| p.default_model.clone()));
                let planner = RemotePlanner::new(
                    api_key,
                    base_url,
                    model,
                    state.config.max_rounds(),
                    &state.catalog,
                );
                let resolved = planner.model().to_string();
                (Box::new(planner), Some(resolved))
            }
            other => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown provider '{other}'"),
                );
            }
        };

    let plan_request = PlanRequest {
        message: request.message.clone(),
        conversation: request.conversation.clone(),
        context: request.context.clone(),
        profile: request.profile.clone(),
    };

    match planner.plan(&state.relay, &plan_request).await {
        Ok(outcome) => Json(ChatResponse {
            assistant: outcome.assistant,
            provider: request.provider,
            model: resolved_model,
            tool_calls: outcome.tool_calls,
        })
        .into_response(),
        Err(DrawbridgeError::Connectivity(message)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, message)
        }
        Err(DrawbridgeError::Planner(message)) => error_response(StatusCode::BAD_GATEWAY, message),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Long-poll: blocks until an invocation is available. A second poll while
/// one is parked is a caller error and gets a 409 rather than silently
/// displacing the first.
async fn poll_handler(State(state): State<Arc<ServerState>>) -> Response {
    match state.relay.poll_request().await {
        PollOutcome::Ready(frame) => Json(frame).into_response(),
        PollOutcome::Busy => error_response(
            StatusCode::CONFLICT,
            "another poll request is already waiting",
        ),
        PollOutcome::Parked(parked) => match parked.await {
            Ok(frame) => Json(frame).into_response(),
            Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "relay shut down"),
        },
    }
}

/// Reply ingress for the long-poll transport; fans into the same settle path
/// as socket replies. Unknown ids are a no-op by design.
async fn result_handler(
    State(state): State<Arc<ServerState>>,
    Json(reply): Json<ReplyFrame>,
) -> impl IntoResponse {
    debug!(id = %reply.id, "Result posted by polling executor");
    state.relay.deliver_reply(reply).await;
    Json(json!({ "ok": true }))
}

async fn prompt_handler(
    State(state): State<Arc<ServerState>>,
    Json(prompt): Json<PromptRequest>,
) -> impl IntoResponse {
    state.set_canvas_message(prompt.text).await;
    Json(json!({ "ok": true }))
}
