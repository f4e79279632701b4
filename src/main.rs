#![forbid(unsafe_code)]

//! Host binary: starts the orchestragent MCP server, keeps the session
//! cache fresh, and logs snapshot changes until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use orchestragent_client::config::ClientConfig;
use orchestragent_client::notify::{Notifier, TracingNotifier};
use orchestragent_client::orchestrator::startup::{self, StartupOutcome};
use orchestragent_client::orchestrator::{McpClient, SessionCache, ToolCaller};
use orchestragent_client::process::monitor::{self, POLL_INTERVAL};
use orchestragent_client::{AppError, Result};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "orchestragent-client",
    about = "Stdio client for the orchestragent MCP server",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Override the repository the server operates on.
    #[arg(long)]
    repository: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("orchestragent-client bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = ClientConfig::load_from_path(&args.config)?;
    if let Some(repository) = args.repository {
        config.repository_path = Some(repository);
    }
    let config = Arc::new(config);

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let client = Arc::new(McpClient::new(Arc::clone(&config), Arc::clone(&notifier)));
    let cache = Arc::new(SessionCache::new(
        Arc::clone(&client) as Arc<dyn ToolCaller>
    ));

    let outcome = startup::initialize(&client, &cache).await;
    info!(?outcome, "startup finished");

    let ct = CancellationToken::new();
    let mut handles = Vec::new();

    if matches!(
        outcome,
        StartupOutcome::Ready { .. } | StartupOutcome::SessionsUnavailable
    ) {
        handles.push(cache.spawn_refresh_loop(config.refresh_interval(), ct.clone()));
        handles.push(monitor::spawn_exit_monitor(
            Arc::clone(client.process()),
            Arc::clone(client.protocol()),
            Arc::clone(&notifier),
            POLL_INTERVAL,
            ct.clone(),
        ));
    }

    handles.push(spawn_snapshot_logger(&cache, ct.clone()));

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    client.shutdown().await;

    for handle in handles {
        if let Err(err) = handle.await {
            warn!(%err, "background task ended abnormally");
        }
    }
    info!("orchestragent-client shut down");

    Ok(())
}

/// Log every published session snapshot.
fn spawn_snapshot_logger(
    cache: &SessionCache,
    ct: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = cache.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = ct.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let sessions = rx.borrow_and_update().clone();
                    info!(count = sessions.len(), "session snapshot updated");
                    for session in &sessions {
                        info!(
                            session_id = session.id(),
                            branch = session.branch_name(),
                            status = %session.status(),
                            "session"
                        );
                    }
                }
            }
        }
    })
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    tracing::error!(%err, "ctrl-c signal handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}
