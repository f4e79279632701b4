//! JSON-RPC 2.0 over the MCP server's stdio streams.
//!
//! - `message`: request/response/error envelopes.
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based NDJSON framing.
//! - `retry`: exponential backoff loop used for connecting.
//! - `client`: the single-flight request/response client.

pub mod client;
pub mod codec;
pub mod message;
pub mod retry;

pub use client::{ConnectionState, ProtocolClient};
pub use message::{RpcError, RpcRequest, RpcResponse, ToolCallParams};
