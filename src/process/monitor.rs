//! Server exit monitor: detects an MCP server that dies while connected.
//!
//! Periodically checks the process. When the client still believes it is
//! connected but the process has exited, the monitor disconnects the
//! protocol client and notifies the host once. Disconnecting clears the
//! connected flag, so the same exit is never reported twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::notify::Notifier;
use crate::process::ProcessManager;
use crate::rpc::{ConnectionState, ProtocolClient};

/// Default interval between liveness polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the exit monitor.
///
/// The task polls every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_exit_monitor(
    process: Arc<ProcessManager>,
    protocol: Arc<ProtocolClient>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("server exit monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            check_once(&process, &protocol, notifier.as_ref()).await;
        }
    })
}

/// One poll: returns `true` when an unexpected exit was handled.
pub async fn check_once(
    process: &ProcessManager,
    protocol: &ProtocolClient,
    notifier: &dyn Notifier,
) -> bool {
    if protocol.connection_state() != ConnectionState::Connected || process.is_alive().await {
        return false;
    }

    warn!("MCP server process exited while connected");
    protocol.disconnect().await;
    notifier.error(
        "MCP Server Error",
        "MCP server process exited unexpectedly. Restart the server to reconnect.",
    );
    true
}
