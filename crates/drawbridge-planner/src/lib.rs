//! Agent tool-calling loop.
//!
//! A [`Planner`] decides which tool invocations to issue for one chat turn,
//! executes them through the relay one at a time, and assembles a final
//! textual reply plus an audit trail. Two implementations share the contract:
//! the deterministic [`LocalPlanner`] and the [`RemotePlanner`] driving an
//! OpenAI-compatible completion endpoint.

use async_trait::async_trait;

use drawbridge_core::protocol::{ConversationTurn, ExecutedToolCall};
use drawbridge_core::{DrawbridgeError, Result};
use drawbridge_relay::Relay;

pub mod local;
pub mod remote;
pub mod responses;

pub use local::LocalPlanner;
pub use remote::RemotePlanner;

/// How many trailing conversation turns are replayed to the remote planner.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Input for one chat turn.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub message: String,
    pub conversation: Vec<ConversationTurn>,
    /// Free-text context from the caller (e.g. current page description).
    pub context: Option<String>,
    /// Free-text profile (brand voice, preferences).
    pub profile: Option<String>,
}

/// Final reply and the audit trail of every call issued.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub assistant: String,
    pub tool_calls: Vec<ExecutedToolCall>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Planner identifier (e.g. "local", "openai").
    fn id(&self) -> &str;

    /// Run one chat turn against the relay.
    async fn plan(&self, relay: &Relay, request: &PlanRequest) -> Result<PlanOutcome>;
}

/// Fail fast before dispatching invocations that would only time out.
pub(crate) async fn ensure_executor_ready(relay: &Relay) -> Result<()> {
    if relay.executor_ready().await {
        Ok(())
    } else {
        Err(DrawbridgeError::Connectivity(
            "no canvas executor has connected; open the canvas plugin and retry".into(),
        ))
    }
}
