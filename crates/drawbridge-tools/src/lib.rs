//! Drawing-tool catalog.
//!
//! Every entry describes one operation the canvas executor can perform.
//! Execution happens on the canvas side, so an entry here is a name, a
//! description, and a parameter schema, nothing more.

pub mod catalog;

pub use catalog::{ToolCatalog, ToolSpec, CANVAS_MESSAGE_TOOL};
