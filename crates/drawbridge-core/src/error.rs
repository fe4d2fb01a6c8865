use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrawbridgeError {
    #[error("Config error: {0}")]
    Config(String),

    /// No executor reachable — raised before dispatch.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Dispatched but no reply within the deadline.
    #[error("Invocation timed out: {0}")]
    Timeout(String),

    /// Explicit error payload from the canvas executor.
    #[error("Executor error: {0}")]
    Executor(String),

    /// Remote completion endpoint failed or returned a malformed payload.
    #[error("Planner error: {0}")]
    Planner(String),

    /// No port pair could be bound within the configured range. Fatal.
    #[error("Port exhaustion: {0}")]
    PortExhaustion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DrawbridgeError>;
