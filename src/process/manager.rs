//! MCP server process manager.
//!
//! Owns at most one child process at a time. The child is spawned with all
//! three stdio streams piped and `kill_on_drop(true)`, so dropping the
//! manager never leaks a server. Start and stop hold the child slot lock for
//! their whole duration, which makes them mutually exclusive.
//!
//! Stopping is graceful-then-forced: SIGTERM (unix), wait up to the grace
//! period, then kill and reap.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::ProcessStartError;
use crate::{AppError, Result};

/// Default time a server gets to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Program, arguments, and working directory of a server launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Binary to execute.
    pub program: PathBuf,
    /// Arguments passed after the program.
    pub args: Vec<String>,
    /// Working directory; `None` inherits the host's.
    pub current_dir: Option<PathBuf>,
}

impl LaunchSpec {
    /// Launch `program` with no arguments in the inherited directory.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the process in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl Display for LaunchSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Single-slot owner of the MCP server child process.
#[derive(Debug)]
pub struct ProcessManager {
    child: Mutex<Option<Child>>,
    stop_grace: Duration,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    /// Create an empty manager with [`DEFAULT_STOP_GRACE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_stop_grace(DEFAULT_STOP_GRACE)
    }

    /// Create an empty manager with a custom SIGTERM grace period.
    #[must_use]
    pub fn with_stop_grace(stop_grace: Duration) -> Self {
        Self {
            child: Mutex::new(None),
            stop_grace,
        }
    }

    /// Start the server described by `spec`, replacing any running one.
    ///
    /// A previous child (alive or already exited) is fully stopped and
    /// reaped before the new one is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessStartError`] carrying the binary path and the OS
    /// error when the spawn fails (missing binary, permission denied, …).
    pub async fn start(&self, spec: &LaunchSpec) -> std::result::Result<u32, ProcessStartError> {
        let mut slot = self.child.lock().await;

        if let Some(mut previous) = slot.take() {
            warn!("MCP server process already present, stopping existing process");
            terminate(&mut previous, self.stop_grace).await;
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| ProcessStartError {
            binary: spec.program.clone(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        info!(pid, command = %spec, "MCP server process started");
        *slot = Some(child);
        Ok(pid)
    }

    /// Boolean form of [`start`](Self::start): failures are logged and
    /// reported as `false`.
    pub async fn start_process(&self, spec: &LaunchSpec) -> bool {
        match self.start(spec).await {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "failed to start MCP server process");
                false
            }
        }
    }

    /// Stop the server if one is running. Idempotent and infallible.
    pub async fn stop(&self) {
        let mut slot = self.child.lock().await;
        match slot.take() {
            Some(mut child) => terminate(&mut child, self.stop_grace).await,
            None => debug!("no MCP server process to stop"),
        }
    }

    /// Whether the OS still reports the child as running.
    pub async fn is_alive(&self) -> bool {
        let mut slot = self.child.lock().await;
        slot.as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// OS process id of the current child, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    /// Move the child's stdin (client → server) and stdout (server →
    /// client) pipes out of the handle.
    ///
    /// # Errors
    ///
    /// - `AppError::Process("process is not running")`: no live child.
    /// - `AppError::Process("stdio streams unavailable …")`: the pipes were
    ///   already taken.
    pub async fn take_stdio(&self) -> Result<(ChildStdin, ChildStdout)> {
        let mut slot = self.child.lock().await;
        let child = live_child(&mut slot)?;

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => Ok((stdin, stdout)),
            (stdin, stdout) => {
                // Put back whichever half was still present.
                child.stdin = stdin;
                child.stdout = stdout;
                Err(AppError::Process(
                    "stdio streams unavailable: already taken".into(),
                ))
            }
        }
    }

    /// Move the child's stderr pipe out of the handle.
    ///
    /// # Errors
    ///
    /// - `AppError::Process("process is not running")`: no live child.
    /// - `AppError::Process("stderr stream unavailable …")`: already taken.
    pub async fn take_stderr(&self) -> Result<ChildStderr> {
        let mut slot = self.child.lock().await;
        live_child(&mut slot)?
            .stderr
            .take()
            .ok_or_else(|| AppError::Process("stderr stream unavailable: already taken".into()))
    }
}

fn live_child(slot: &mut Option<Child>) -> Result<&mut Child> {
    let Some(child) = slot.as_mut() else {
        return Err(AppError::Process("process is not running".into()));
    };
    if !matches!(child.try_wait(), Ok(None)) {
        return Err(AppError::Process("process is not running".into()));
    }
    Ok(child)
}

/// Terminate `child` gracefully, escalating to a kill after `grace`, and
/// reap it. Never fails; problems are logged.
async fn terminate(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!(code = status.code(), "MCP server process had already exited");
            return;
        }
        Ok(None) => {}
        Err(err) => warn!(%err, "failed to poll MCP server process status"),
    }

    let pid = child.id().unwrap_or(0);
    info!(pid, "stopping MCP server process");

    if request_termination(child) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, code = status.code(), "MCP server process stopped");
                return;
            }
            Ok(Err(err)) => warn!(pid, %err, "error waiting for MCP server process"),
            Err(_elapsed) => warn!(
                pid,
                ?grace,
                "MCP server process ignored SIGTERM, killing"
            ),
        }
    }

    // kill() also waits, so the handle is reaped either way.
    match child.kill().await {
        Ok(()) => info!(pid, "MCP server process killed"),
        Err(err) => warn!(pid, %err, "failed to kill MCP server process"),
    }
}

/// Send SIGTERM. Returns `false` when the signal could not be delivered and
/// the caller should kill outright.
#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            warn!(pid = raw, %err, "failed to send SIGTERM to MCP server process");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}
