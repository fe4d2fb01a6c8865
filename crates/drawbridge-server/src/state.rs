//! Shared server state.

use std::sync::Arc;

use tokio::sync::Mutex;

use drawbridge_core::config::Config;
use drawbridge_relay::Relay;
use drawbridge_tools::ToolCatalog;

use crate::negotiate::PortBinding;

/// State shared by the control surface, the executor socket handler, and the
/// stdio tool surface.
pub struct ServerState {
    pub config: Arc<Config>,
    pub relay: Arc<Relay>,
    pub catalog: Arc<ToolCatalog>,
    pub binding: PortBinding,
    /// Most recent free-text handoff typed on the canvas side. Read once and
    /// cleared by the `get_and_clear_last_canvas_message` tool.
    canvas_message: Mutex<Option<String>>,
}

impl ServerState {
    pub fn new(
        config: Arc<Config>,
        relay: Arc<Relay>,
        catalog: Arc<ToolCatalog>,
        binding: PortBinding,
    ) -> Self {
        Self {
            config,
            relay,
            catalog,
            binding,
            canvas_message: Mutex::new(None),
        }
    }

    pub async fn set_canvas_message(&self, text: String) {
        *self.canvas_message.lock().await = Some(text);
    }

    /// Take the stored handoff message, leaving the slot empty.
    pub async fn take_canvas_message(&self) -> Option<String> {
        self.canvas_message.lock().await.take()
    }
}
