//! MCP server process lifecycle.
//!
//! - `manager`: single-slot child process owner (start, stop, liveness,
//!   stdio acquisition).
//! - `monitor`: background task that notices an unexpected server exit.

pub mod manager;
pub mod monitor;

pub use manager::{LaunchSpec, ProcessManager};
