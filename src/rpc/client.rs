//! JSON-RPC client over the MCP server's stdio.
//!
//! The transport has no request multiplexing: one request line is written,
//! then exactly one reply line is read. The framed connection sits behind an
//! async mutex held for the whole write+read exchange, so concurrent callers
//! are served one at a time and can never receive each other's replies.
//!
//! # Connection state
//!
//! ```text
//! Disconnected --connect--> Connected --disconnect / stream failure--> Disconnected
//! ```
//!
//! [`ProtocolClient::is_connected`] additionally requires the server process
//! to be alive, so a crashed server reads as disconnected even before anyone
//! calls [`ProtocolClient::disconnect`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::TransportError;
use crate::process::ProcessManager;
use crate::rpc::codec::RpcCodec;
use crate::rpc::message::{RpcRequest, RpcResponse};
use crate::rpc::retry::retry_with_backoff;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Whether the client holds open server streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No streams attached; requests fail with [`TransportError::NotConnected`].
    Disconnected,
    /// Streams attached; requests are exchanged.
    Connected,
}

/// Framed halves of an attached connection.
struct Connection {
    reader: FramedRead<BoxedReader, RpcCodec>,
    writer: FramedWrite<BoxedWriter, RpcCodec>,
}

/// Line-delimited JSON-RPC client bound to a [`ProcessManager`].
pub struct ProtocolClient {
    process: Arc<ProcessManager>,
    connection: Mutex<Option<Connection>>,
    connected: AtomicBool,
    request_timeout: Option<Duration>,
    retry_cancel: StdMutex<CancellationToken>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("state", &self.connection_state())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    /// Create a disconnected client for the server owned by `process`.
    #[must_use]
    pub fn new(process: Arc<ProcessManager>) -> Self {
        Self {
            process,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            request_timeout: None,
            retry_cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    /// Fail requests whose reply takes longer than `timeout`.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Attach to the running server's stdin/stdout.
    ///
    /// Returns `false` (and logs why) when the process is not running or
    /// its streams cannot be acquired. Calling this while already connected
    /// is a no-op that returns `true`.
    pub async fn connect(&self) -> bool {
        if !self.process.is_alive().await {
            warn!("cannot connect: MCP server process is not running");
            return false;
        }

        if self.connected.load(Ordering::SeqCst) && self.connection.lock().await.is_some() {
            debug!("already connected to MCP server");
            return true;
        }

        match self.process.take_stdio().await {
            Ok((stdin, stdout)) => {
                self.connect_streams(stdout, stdin).await;
                true
            }
            Err(err) => {
                warn!(%err, "cannot connect: server streams unavailable");
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Attach to already-open streams, e.g. an in-process server.
    ///
    /// Any previous connection is dropped.
    pub async fn connect_streams<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = Connection {
            reader: FramedRead::new(Box::new(reader) as BoxedReader, RpcCodec::new()),
            writer: FramedWrite::new(Box::new(writer) as BoxedWriter, RpcCodec::new()),
        };
        *self.connection.lock().await = Some(connection);
        self.connected.store(true, Ordering::SeqCst);
        info!("connected to MCP server");
    }

    /// Call [`connect`](Self::connect) up to `max_retries` times with
    /// exponential backoff starting at `initial_delay`.
    ///
    /// A concurrent [`cancel_retries`](Self::cancel_retries) abandons the
    /// loop and yields `false`.
    pub async fn connect_with_retry(&self, max_retries: u32, initial_delay: Duration) -> bool {
        self.connect_with_retry_until(max_retries, initial_delay, &CancellationToken::new())
            .await
    }

    /// [`connect_with_retry`](Self::connect_with_retry) bound to a
    /// caller-owned token. [`cancel_retries`](Self::cancel_retries) also
    /// stops it.
    pub async fn connect_with_retry_until(
        &self,
        max_retries: u32,
        initial_delay: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let cancel = self.link_retry_token(cancel);
        let connected = retry_with_backoff(max_retries, initial_delay, &cancel, |attempt| {
            info!(attempt, max_retries, "attempting to connect to MCP server");
            self.connect()
        })
        .await;

        if connected {
            info!("successfully connected to MCP server");
        } else if cancel.is_cancelled() {
            info!("connect retries cancelled");
        } else {
            warn!(max_retries, "failed to connect to MCP server");
        }
        connected
    }

    /// Abandon an in-progress [`connect_with_retry`](Self::connect_with_retry).
    pub fn cancel_retries(&self) {
        self.retry_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Send `request` and wait for its single reply line.
    ///
    /// Stream closure, I/O failures, and timeouts drop the connection and
    /// demote the client to [`ConnectionState::Disconnected`]; a malformed
    /// reply leaves the connection in place.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`]: not connected; nothing was written.
    /// - [`TransportError::Closed`]: the server closed stdout before replying.
    /// - [`TransportError::MalformedPayload`]: the reply is not a JSON-RPC
    ///   response.
    /// - [`TransportError::Io`]: the write or read failed.
    /// - [`TransportError::Timeout`]: no reply within the request timeout.
    pub async fn send_request(
        &self,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            error!(method = request.method(), "cannot send request: not connected to MCP server");
            return Err(TransportError::NotConnected);
        }

        let line = serde_json::to_string(request).map_err(|e| {
            TransportError::MalformedPayload(format!("failed to encode request: {e}"))
        })?;

        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::NotConnected);
        };

        debug!(id = request.id(), method = request.method(), "sending request");
        let exchange = exchange(connection, line);
        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => exchange.await,
        };

        match &outcome {
            Ok(response) if response.id != request.id() => {
                warn!(
                    expected = request.id(),
                    received = %response.id,
                    "response id does not match request id"
                );
            }
            Ok(_) | Err(TransportError::MalformedPayload(_) | TransportError::NotConnected) => {}
            Err(TransportError::Closed | TransportError::Io(_) | TransportError::Timeout) => {
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
            }
        }

        if let Err(err) = &outcome {
            error!(%err, method = request.method(), "error sending request to MCP server");
        }
        outcome
    }

    /// Close the streams and mark the client disconnected.
    ///
    /// Never fails; close errors are logged. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let previous = self.connection.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);

        let Some(connection) = previous else {
            debug!("disconnect: no open connection");
            return;
        };

        let mut writer = connection.writer.into_inner();
        if let Err(err) = writer.shutdown().await {
            warn!(%err, "error closing MCP server stdin");
        }
        drop(writer);
        drop(connection.reader);
        info!("disconnected from MCP server");
    }

    /// Connected flag and live server process.
    pub async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.process.is_alive().await
    }

    /// Connection state as last set by connect/disconnect/stream failures,
    /// without consulting the process.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Child of `parent` registered as the current retry token, so either
    /// side cancels the loop.
    fn link_retry_token(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self
            .retry_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}

/// Write one request line, flush, then read the next non-blank line.
async fn exchange(
    connection: &mut Connection,
    line: String,
) -> Result<RpcResponse, TransportError> {
    connection.writer.send(line).await?;

    loop {
        match connection.reader.next().await {
            None => return Err(TransportError::Closed),
            Some(Err(err)) => return Err(err),
            Some(Ok(reply)) if reply.trim().is_empty() => {}
            Some(Ok(reply)) => {
                debug!(raw = %reply, "received response");
                return serde_json::from_str(&reply).map_err(|e| {
                    TransportError::MalformedPayload(format!("invalid response: {e}"))
                });
            }
        }
    }
}
