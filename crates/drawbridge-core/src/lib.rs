//! Core types, config, errors, and wire protocol for Drawbridge.

pub mod config;
pub mod error;
pub mod protocol;

pub use error::{DrawbridgeError, Result};
