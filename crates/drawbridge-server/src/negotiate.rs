//! Paired-port negotiation.
//!
//! The control (HTTP) listener binds on port P and the data (WebSocket)
//! listener on P-1. On contention both are released and the pair moves up by
//! two. Each retry carries a fresh monotonically increasing attempt id; only
//! the newest attempt may publish a binding, so a superseded attempt's
//! outcome can never be advertised.

use tokio::net::TcpListener;
use tracing::{info, warn};

use drawbridge_core::{DrawbridgeError, Result};

/// The port pair currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub control_port: u16,
    pub data_port: u16,
    pub attempt: u64,
}

/// Listeners actually held for the published binding.
#[derive(Debug)]
pub struct NegotiatedListeners {
    pub binding: PortBinding,
    pub control: TcpListener,
    pub data: TcpListener,
}

/// Explicit retry state machine keyed by a monotonic attempt counter.
pub struct PortNegotiator {
    bind: String,
    attempt: u64,
}

impl PortNegotiator {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            attempt: 0,
        }
    }

    /// Settle on the first available pair with control port in
    /// `start_port..=max_port`. Exceeding `max_port` is fatal for the caller.
    pub async fn negotiate(&mut self, start_port: u16, max_port: u16) -> Result<NegotiatedListeners> {
        if start_port < 2 {
            return Err(DrawbridgeError::Config(format!(
                "starting port {start_port} leaves no room for the data port below it"
            )));
        }

        let mut control_port = start_port;
        while control_port <= max_port {
            self.attempt += 1;
            let attempt = self.attempt;
            let data_port = control_port - 1;

            match self.try_pair(control_port, data_port).await {
                Ok((control, data)) => {
                    if attempt != self.attempt {
                        // A newer attempt superseded this one while it was in
                        // flight; its listeners are dropped, not advertised.
                        continue;
                    }
                    info!(control_port, data_port, attempt, "Bound relay port pair");
                    return Ok(NegotiatedListeners {
                        binding: PortBinding {
                            control_port,
                            data_port,
                            attempt,
                        },
                        control,
                        data,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!(control_port, data_port, "Port pair busy, trying next");
                    control_port += 2;
                }
                Err(e) => return Err(DrawbridgeError::Io(e)),
            }
        }

        Err(DrawbridgeError::PortExhaustion(format!(
            "no free control/data port pair with control in {start_port}..={max_port}"
        )))
    }

    /// Bind the control listener, probe the data port for availability, then
    /// bind the data listener. Early returns release whatever was opened.
    async fn try_pair(
        &self,
        control_port: u16,
        data_port: u16,
    ) -> std::io::Result<(TcpListener, TcpListener)> {
        let control = TcpListener::bind((self.bind.as_str(), control_port)).await?;

        // Probe the data port before committing to the real bind.
        let probe = std::net::TcpListener::bind((self.bind.as_str(), data_port))?;
        drop(probe);

        let data = TcpListener::bind((self.bind.as_str(), data_port)).await?;
        Ok((control, data))
    }
}
