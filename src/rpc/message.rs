//! JSON-RPC 2.0 envelope types.
//!
//! ```json
//! {"jsonrpc":"2.0","id":"5f0c…","method":"tools/call",
//!  "params":{"name":"get_sessions","arguments":{}}}
//! {"jsonrpc":"2.0","id":"5f0c…","result":[…]}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Protocol version carried in every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method used for every tool invocation.
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// Outbound JSON-RPC request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    jsonrpc: String,
    id: String,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl RpcRequest {
    /// Build a request with an explicit id.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a request with a fresh UUID v4 id.
    #[must_use]
    pub fn with_generated_id(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(Uuid::new_v4().to_string(), method, params)
    }

    /// Protocol version string.
    #[must_use]
    pub fn jsonrpc(&self) -> &str {
        &self.jsonrpc
    }

    /// Correlation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Method parameters.
    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

/// Inbound JSON-RPC response. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version echoed by the server.
    pub jsonrpc: String,
    /// Id of the request this answers.
    pub id: String,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Whether the server reported an application-level error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool name, e.g. `get_sessions`.
    pub name: String,
    /// String-keyed tool arguments.
    pub arguments: HashMap<String, String>,
}
