//! Relay server wiring.
//!
//! Binds the negotiated control/data port pair, serves the HTTP control
//! surface and the executor WebSocket, and optionally speaks the stdio tool
//! protocol alongside.

use std::sync::Arc;

use tracing::info;

pub mod executor;
pub mod http;
pub mod negotiate;
pub mod state;
pub mod stdio;

pub use negotiate::{NegotiatedListeners, PortBinding, PortNegotiator};
pub use state::ServerState;
pub use stdio::run_stdio_surface;

/// Serve the control and data listeners until either fails or a shutdown
/// signal arrives.
pub async fn start_server(state: Arc<ServerState>, listeners: NegotiatedListeners) -> anyhow::Result<()> {
    let control_app = http::control_router(state.clone());
    let data_app = executor::data_router(state.clone());

    info!(
        control_port = state.binding.control_port,
        data_port = state.binding.data_port,
        "Relay listening"
    );

    tokio::select! {
        result = async { axum::serve(listeners.control, control_app).await } => result?,
        result = async { axum::serve(listeners.data, data_app).await } => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
