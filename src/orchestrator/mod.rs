//! Client orchestration modules.
//!
//! Covers the MCP client facade (server start, connect, tool calls,
//! shutdown), the session cache, and the host startup sequence.

pub mod client;
pub mod session_cache;
pub mod startup;

pub use client::{McpClient, ToolCaller};
pub use session_cache::SessionCache;
