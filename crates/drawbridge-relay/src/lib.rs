//! Command relay — correlates outbound tool invocations with inbound replies.
//!
//! One [`Relay`] owns all in-flight state: the pending-invocation map, the
//! FIFO of undelivered invocations, the single parked long-poll slot, and the
//! current executor socket. Replies arriving over either transport fan into
//! the same settle-by-id path.

pub mod relay;

pub use relay::{PollOutcome, Relay, DEFAULT_DISPATCH_TIMEOUT};
