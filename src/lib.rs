#![forbid(unsafe_code)]

//! Stdio JSON-RPC client for the orchestragent MCP server.
//!
//! - [`process`]: server child-process lifecycle.
//! - [`rpc`]: line-delimited JSON-RPC transport with connect retry.
//! - [`orchestrator`]: client facade, session cache, startup sequence.

pub mod config;
pub mod errors;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod process;
pub mod rpc;

pub use config::ClientConfig;
pub use errors::{AppError, ProcessStartError, Result, TransportError};
