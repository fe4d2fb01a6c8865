//! Relay state machine: pending map, delivery FIFO, parked poll, socket.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use drawbridge_core::protocol::{InvocationFrame, ReplyFrame};
use drawbridge_core::{DrawbridgeError, Result};

/// Fixed per-invocation deadline.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

type SettleTx = oneshot::Sender<Result<serde_json::Value>>;

/// Exactly one per in-flight invocation, keyed by id in the pending map.
struct PendingInvocation {
    settle: SettleTx,
}

/// Outcome of a long-poll request against the relay.
pub enum PollOutcome {
    /// The FIFO had an invocation waiting; answer immediately.
    Ready(InvocationFrame),
    /// No work queued; the caller holds the parked-poll slot and must await
    /// the receiver.
    Parked(oneshot::Receiver<InvocationFrame>),
    /// Another poll is already parked and still live; the caller must back off.
    Busy,
}

struct RelayState {
    pending: HashMap<String, PendingInvocation>,
    queue: VecDeque<InvocationFrame>,
    parked: Option<oneshot::Sender<InvocationFrame>>,
    socket: Option<mpsc::UnboundedSender<String>>,
    /// Incremented on every socket registration. A close event carrying a
    /// stale generation must not flush the current socket's pendings.
    socket_generation: u64,
    /// True once any executor contact happened (socket or poll).
    executor_seen: bool,
}

impl RelayState {
    /// Hand one invocation to the executor: socket push, parked poll, or FIFO.
    fn deliver(&mut self, frame: InvocationFrame) {
        if let Some(socket) = self.socket.take() {
            match serde_json::to_string(&frame) {
                Ok(msg) => {
                    if socket.send(msg).is_ok() {
                        self.socket = Some(socket);
                        return;
                    }
                    // Writer task is gone; leave the socket dropped and fall
                    // through to the queue path. The close handler flushes
                    // pendings separately.
                }
                Err(e) => {
                    warn!(%e, tool = %frame.tool, "Failed to encode invocation frame");
                    self.socket = Some(socket);
                }
            }
        }

        self.queue.push_back(frame);
        self.satisfy_parked();
    }

    /// Complete the parked poll, if any, with the oldest queued invocation.
    fn satisfy_parked(&mut self) {
        if let Some(parked) = self.parked.take() {
            let Some(frame) = self.queue.pop_front() else {
                self.parked = Some(parked);
                return;
            };
            if let Err(frame) = parked.send(frame) {
                // The poller disconnected while parked; keep the invocation
                // at the head of the FIFO for the next poll.
                self.queue.push_front(frame);
            }
        }
    }

    /// Reject every pending invocation and drop their queue entries.
    fn flush_pending(&mut self, reason: &str) {
        let count = self.pending.len();
        for (_, invocation) in self.pending.drain() {
            let _ = invocation.settle.send(Err(DrawbridgeError::Connectivity(format!(
                "executor disconnected: {reason}"
            ))));
        }
        self.queue.clear();
        if count > 0 {
            debug!(count, reason, "Flushed pending invocations");
        }
    }
}

/// The command relay. One instance per process in production; tests create
/// as many as they need.
pub struct Relay {
    state: Mutex<RelayState>,
    timeout: Duration,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DISPATCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RelayState {
                pending: HashMap::new(),
                queue: VecDeque::new(),
                parked: None,
                socket: None,
                socket_generation: 0,
                executor_seen: false,
            }),
            timeout,
        }
    }

    /// Issue one tool invocation and await its reply.
    ///
    /// Resolves with the executor's result payload, or rejects with
    /// [`DrawbridgeError::Executor`] (explicit error reply),
    /// [`DrawbridgeError::Timeout`] (deadline fired), or
    /// [`DrawbridgeError::Connectivity`] (socket dropped mid-flight).
    pub async fn dispatch(&self, tool: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = invocation_id();
        let (settle, settled) = oneshot::channel();
        let frame = InvocationFrame {
            id: id.clone(),
            tool: tool.to_string(),
            params,
        };

        {
            let mut state = self.state.lock().await;
            state.pending.insert(id.clone(), PendingInvocation { settle });
            state.deliver(frame);
        }

        debug!(%id, tool, "Dispatched invocation");

        match tokio::time::timeout(self.timeout, settled).await {
            Ok(Ok(outcome)) => outcome,
            // The settle sender was dropped without firing; only possible if
            // the relay itself is being torn down.
            Ok(Err(_)) => Err(DrawbridgeError::Connectivity(
                "relay shut down while awaiting reply".into(),
            )),
            Err(_) => {
                let mut state = self.state.lock().await;
                state.pending.remove(&id);
                // A still-queued invocation must not reach the executor after
                // its caller has given up.
                state.queue.retain(|q| q.id != id);
                Err(DrawbridgeError::Timeout(format!(
                    "no reply for '{tool}' within {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Settle-by-id fan-in for both reply ingress paths (socket message,
    /// `POST /result`). Unknown or late ids are dropped silently; late
    /// replies are expected under network churn, not an error.
    pub async fn deliver_reply(&self, reply: ReplyFrame) {
        let mut state = self.state.lock().await;
        let Some(invocation) = state.pending.remove(&reply.id) else {
            debug!(id = %reply.id, "Dropping reply for unknown or timed-out invocation");
            return;
        };

        let outcome = match reply.error {
            Some(message) => Err(DrawbridgeError::Executor(message)),
            None => Ok(reply.result.unwrap_or(serde_json::Value::Null)),
        };
        let _ = invocation.settle.send(outcome);
    }

    /// Reject every pending invocation with `reason`.
    pub async fn disconnect_all(&self, reason: &str) {
        let mut state = self.state.lock().await;
        state.flush_pending(reason);
    }

    /// Install a new executor socket. Always replaces the current one
    /// (single-writer model) and immediately claims any queued invocations.
    /// Returns the socket generation to pass back to [`Relay::socket_closed`].
    pub async fn register_socket(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let mut state = self.state.lock().await;
        state.socket_generation += 1;
        let generation = state.socket_generation;
        state.executor_seen = true;

        while let Some(frame) = state.queue.pop_front() {
            match serde_json::to_string(&frame) {
                Ok(msg) => {
                    if tx.send(msg).is_err() {
                        state.queue.push_front(frame);
                        break;
                    }
                }
                Err(e) => {
                    warn!(%e, tool = %frame.tool, "Dropping unencodable queued invocation");
                }
            }
        }

        state.socket = Some(tx);
        debug!(generation, "Executor socket registered");
        generation
    }

    /// Handle a socket teardown, from any close path. Only the socket that is
    /// still current may flush pendings; a stale generation is discarded so a
    /// replaced socket's close cannot reject the new socket's invocations.
    pub async fn socket_closed(&self, generation: u64, reason: &str) {
        let mut state = self.state.lock().await;
        if state.socket_generation != generation {
            debug!(generation, current = state.socket_generation, "Ignoring stale socket close");
            return;
        }
        state.socket = None;
        state.flush_pending(reason);
    }

    /// Handle a long-poll request from the executor.
    pub async fn poll_request(&self) -> PollOutcome {
        let mut state = self.state.lock().await;
        state.executor_seen = true;

        if let Some(frame) = state.queue.pop_front() {
            return PollOutcome::Ready(frame);
        }

        if let Some(existing) = &state.parked {
            if !existing.is_closed() {
                return PollOutcome::Busy;
            }
            // The prior poller disconnected without receiving anything;
            // its slot is free again.
        }

        let (tx, rx) = oneshot::channel();
        state.parked = Some(tx);
        PollOutcome::Parked(rx)
    }

    /// Whether dispatch has any chance of reaching an executor: an open
    /// socket, or at least one prior contact over the poll path.
    pub async fn executor_ready(&self) -> bool {
        let state = self.state.lock().await;
        state.socket.is_some() || state.executor_seen
    }

    /// Whether a socket is open right now (health reporting).
    pub async fn executor_connected(&self) -> bool {
        self.state.lock().await.socket.is_some()
    }

    /// Number of in-flight invocations.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of invocations sitting in the FIFO.
    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }
}

/// Invocation ids: millisecond timestamp plus a random hex suffix. Enough
/// entropy that collision within a process lifetime is negligible.
fn invocation_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u64 = rand::random::<u64>() & 0x0000_ffff_ffff_ffff;
    format!("{millis}-{suffix:012x}")
}
