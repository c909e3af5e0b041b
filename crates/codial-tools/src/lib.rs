//! # codial-tools
//!
//! Built-in tools the turn engine can dispatch without an MCP server:
//! shell execution, file read/write, hashline-anchored editing, glob and
//! regex search, and web fetch. Their specs are merged into the provider
//! tool manifest ahead of MCP discovery, and calls to these names never
//! leave the process.
//!
//! File reads emit hashline output (`lineno:tag| content`): every line
//! carries a short content tag the model can use as an edit anchor, which
//! survives whitespace drift that breaks plain string replacement.

#![deny(unsafe_code)]

pub mod file_read;
pub mod file_write;
pub mod glob_find;
pub mod grep;
pub mod hashline;
pub mod hashline_edit;
pub mod registry;
pub mod shell;
pub mod tool;
pub mod tracker;
pub mod web_fetch;

pub use registry::{builtin_registry, ToolRegistry};
pub use tool::{Tool, ToolOutcome};
pub use tracker::ReadTracker;
