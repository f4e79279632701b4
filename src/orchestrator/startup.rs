//! Host startup sequence.
//!
//! 1. Skip everything when `auto_start_server` is off.
//! 2. Check the resolved server binary; ask the user to configure it when
//!    it is missing or not executable.
//! 3. Start the server and connect.
//! 4. Load the initial session list.

use std::path::PathBuf;

use tracing::{error, info, warn, Instrument};

use crate::config::validate_binary_path;
use crate::orchestrator::client::McpClient;
use crate::orchestrator::session_cache::SessionCache;

/// Result of [`initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// `auto_start_server` is disabled; nothing was started.
    Disabled,
    /// The server binary is missing or not executable.
    BinaryMissing {
        /// Path that was checked.
        path: PathBuf,
    },
    /// The server could not be started or connected.
    ConnectFailed,
    /// Connected, but the initial session list could not be loaded.
    SessionsUnavailable,
    /// Connected and the session cache is populated.
    Ready {
        /// Number of sessions loaded.
        sessions: usize,
    },
}

/// Run the startup sequence. Every failure is reported through the
/// client's notifier; this never returns an error.
pub async fn initialize(client: &McpClient, cache: &SessionCache) -> StartupOutcome {
    async {
        info!("orchestragent client initialization started");
        let config = client.config();

        if !config.auto_start_server {
            info!("auto-start is disabled, skipping MCP server startup");
            return StartupOutcome::Disabled;
        }

        let path = config.resolve_server_binary_path();
        if !validate_binary_path(&path) {
            warn!(path = %path.display(), "MCP server binary not found or not executable");
            client.notifier().warning(
                "MCP Server Configuration Required",
                "MCP server binary not found. Please configure the server path in settings.",
            );
            return StartupOutcome::BinaryMissing { path };
        }

        if !client.start_server_and_connect().await {
            error!("failed to connect to MCP server");
            return StartupOutcome::ConnectFailed;
        }

        match cache.initialize_from_server().await {
            Ok(sessions) => {
                info!(sessions, "orchestragent client initialization completed");
                StartupOutcome::Ready { sessions }
            }
            Err(err) => {
                error!(%err, "error loading initial session list");
                client.notifier().error(
                    "Orchestragent Initialization Error",
                    &format!("Failed to load sessions: {err}"),
                );
                StartupOutcome::SessionsUnavailable
            }
        }
    }
    .instrument(tracing::info_span!("startup"))
    .await
}
