//! MCP client facade: server start + connect, tool calls, shutdown.
//!
//! [`McpClient`] composes the [`ProcessManager`] and [`ProtocolClient`] into
//! one lifecycle and reports outcomes through the host [`Notifier`]. Nothing
//! here panics or returns an error the host must handle to stay up: start
//! and connect collapse to `bool`, tool calls return JSON-RPC errors as data.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::errors::TransportError;
use crate::notify::Notifier;
use crate::process::ProcessManager;
use crate::rpc::message::TOOLS_CALL_METHOD;
use crate::rpc::{ProtocolClient, RpcRequest, RpcResponse, ToolCallParams};

/// Boxed future returned by [`ToolCaller::call_tool`].
pub type ToolCallFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RpcResponse, TransportError>> + Send + 'a>>;

/// Anything that can invoke a named server tool.
///
/// Implemented by [`McpClient`]; the session cache depends only on this
/// trait.
pub trait ToolCaller: Send + Sync {
    /// Invoke tool `name` with string `arguments`.
    ///
    /// A JSON-RPC error reply is `Ok` with `error` populated; `Err` means
    /// the exchange itself failed.
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: HashMap<String, String>,
    ) -> ToolCallFuture<'a>;
}

/// Lifecycle and RPC facade over the MCP server.
pub struct McpClient {
    config: Arc<ClientConfig>,
    process: Arc<ProcessManager>,
    protocol: Arc<ProtocolClient>,
    notifier: Arc<dyn Notifier>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    start_cancel: StdMutex<CancellationToken>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("config", &self.config)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Build a client with its own process manager and protocol client,
    /// configured from `config`.
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, notifier: Arc<dyn Notifier>) -> Self {
        let process = Arc::new(ProcessManager::with_stop_grace(
            config.connection.stop_grace(),
        ));
        let protocol = Arc::new(
            ProtocolClient::new(Arc::clone(&process))
                .with_request_timeout(config.connection.request_timeout()),
        );
        Self::with_parts(config, process, protocol, notifier)
    }

    /// Build a client from externally constructed parts.
    #[must_use]
    pub fn with_parts(
        config: Arc<ClientConfig>,
        process: Arc<ProcessManager>,
        protocol: Arc<ProtocolClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            process,
            protocol,
            notifier,
            stderr_task: Mutex::new(None),
            start_cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Underlying process manager.
    #[must_use]
    pub fn process(&self) -> &Arc<ProcessManager> {
        &self.process
    }

    /// Underlying protocol client.
    #[must_use]
    pub fn protocol(&self) -> &Arc<ProtocolClient> {
        &self.protocol
    }

    /// Host notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Start the configured server and connect with retry/backoff.
    ///
    /// Returns `true` once connected. Every failure is logged, reported to
    /// the notifier, and returned as `false`. A [`shutdown`](Self::shutdown)
    /// issued meanwhile abandons the attempt at any stage and yields `false`
    /// without a failure notification.
    pub async fn start_server_and_connect(&self) -> bool {
        let cancel = self.arm_start_token();
        async {
            let spec = self.config.launch_spec();
            info!(command = %spec, "starting MCP server");

            // Old streams belong to the server being replaced.
            self.protocol.disconnect().await;
            if cancel.is_cancelled() {
                info!("server start abandoned by shutdown");
                return false;
            }

            if let Err(err) = self.process.start(&spec).await {
                warn!(%err, "failed to start MCP server process");
                self.notifier.error(
                    "MCP Server Error",
                    &format!("Failed to start MCP server process: {err}"),
                );
                return false;
            }

            if cancel.is_cancelled() {
                // Shutdown may have stopped the slot before this start took it.
                info!("server start abandoned by shutdown, stopping new process");
                self.process.stop().await;
                return false;
            }

            self.forward_stderr().await;

            info!("connecting to MCP server");
            let policy = &self.config.connection;
            let connected = self
                .protocol
                .connect_with_retry_until(policy.max_retries, policy.initial_delay(), &cancel)
                .await;

            if cancel.is_cancelled() {
                info!("server connect abandoned by shutdown");
                if connected {
                    self.protocol.disconnect().await;
                }
                return false;
            }

            if connected {
                info!("successfully connected to MCP server");
                self.notifier.info("MCP Server", "Connected to MCP server");
            } else {
                warn!("failed to connect to MCP server");
                self.notifier
                    .error("MCP Server Error", "Failed to connect to MCP server");
            }
            connected
        }
        .instrument(info_span!("start_server_and_connect"))
        .await
    }

    /// Invoke tool `name` through `tools/call` with a fresh request id.
    ///
    /// A JSON-RPC error in the reply is reported to the notifier and still
    /// returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] of a failed exchange, after reporting
    /// it to the notifier.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<RpcResponse, TransportError> {
        info!(tool = name, ?arguments, "calling MCP tool");

        let params = ToolCallParams {
            name: name.to_owned(),
            arguments,
        };
        let outcome = match serde_json::to_value(&params) {
            Ok(params) => {
                let request = RpcRequest::with_generated_id(TOOLS_CALL_METHOD, Some(params));
                self.protocol.send_request(&request).await
            }
            Err(err) => Err(TransportError::MalformedPayload(format!(
                "failed to encode tool arguments: {err}"
            ))),
        };

        match &outcome {
            Ok(response) => match &response.error {
                Some(rpc_error) => {
                    warn!(
                        tool = name,
                        code = rpc_error.code,
                        message = %rpc_error.message,
                        "MCP tool call returned an error"
                    );
                    self.notifier.error(
                        "MCP Tool Error",
                        &format!("Tool {name} failed: {}", rpc_error.message),
                    );
                }
                None => info!(tool = name, "MCP tool call successful"),
            },
            Err(err) => {
                warn!(tool = name, %err, "error calling MCP tool");
                self.notifier.error(
                    "MCP Tool Error",
                    &format!("Error calling tool {name}: {err}"),
                );
            }
        }
        outcome
    }

    /// Disconnect, then stop the server. Both steps always run; neither
    /// fails.
    pub async fn shutdown(&self) {
        async {
            info!("shutting down MCP client");
            self.start_cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel();
            self.protocol.cancel_retries();
            self.protocol.disconnect().await;
            self.process.stop().await;

            if let Some(handle) = self.stderr_task.lock().await.take() {
                handle.abort();
            }
            info!("MCP client shutdown complete");
        }
        .instrument(info_span!("shutdown"))
        .await;
    }

    /// Delegates to [`ProtocolClient::is_connected`].
    pub async fn is_connected(&self) -> bool {
        self.protocol.is_connected().await
    }

    fn arm_start_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self
            .start_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Drain the server's stderr into the log so the pipe never fills up.
    async fn forward_stderr(&self) {
        match self.process.take_stderr().await {
            Ok(stderr) => {
                let handle = tokio::spawn(log_stderr(stderr));
                if let Some(previous) = self.stderr_task.lock().await.replace(handle) {
                    previous.abort();
                }
            }
            Err(err) => debug!(%err, "server stderr not forwarded"),
        }
    }
}

impl ToolCaller for McpClient {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: HashMap<String, String>,
    ) -> ToolCallFuture<'a> {
        Box::pin(McpClient::call_tool(self, name, arguments))
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "mcp_server", "{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "server stderr read failed");
                break;
            }
        }
    }
}
