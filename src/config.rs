//! Client configuration parsing, validation, and server binary resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::process::LaunchSpec;
use crate::{AppError, Result};

/// How the configured repository path is handed to the server process.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Pass `--repository <path>` on the command line; keep the inherited
    /// working directory.
    #[default]
    Argument,
    /// Start the server with the repository as its working directory and
    /// no extra arguments.
    WorkingDirectory,
}

/// Connection and process-stop policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConnectionConfig {
    /// Connect attempts made by `start_server_and_connect`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles for every later attempt.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Per-request reply timeout; 0 means wait indefinitely.
    #[serde(default)]
    pub request_timeout_seconds: u64,
    /// Time the server gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            request_timeout_seconds: 0,
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

impl ConnectionConfig {
    /// Initial backoff as a [`Duration`].
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Request timeout, or `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    /// Grace period between SIGTERM and a forced kill.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_stop_grace_seconds() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_bundled_binary_root() -> PathBuf {
    PathBuf::from(".")
}

/// Client configuration parsed from `orchestragent.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Custom MCP server binary; when unset the bundled binary is used.
    #[serde(default)]
    pub mcp_server_path: Option<PathBuf>,
    /// Repository the server operates on.
    #[serde(default)]
    pub repository_path: Option<PathBuf>,
    /// Whether the host starts the server automatically.
    #[serde(default = "default_true")]
    pub auto_start_server: bool,
    /// Seconds between background session refreshes.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Branch new sessions are based on.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Command the server runs to verify a session; empty means none.
    #[serde(default)]
    pub test_command: String,
    /// How `repository_path` reaches the server process.
    #[serde(default)]
    pub launch_mode: LaunchMode,
    /// Directory containing the bundled `bin/<platform>/` tree.
    #[serde(default = "default_bundled_binary_root")]
    pub bundled_binary_root: PathBuf,
    /// Connection retry and stop policy.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mcp_server_path: None,
            repository_path: None,
            auto_start_server: true,
            refresh_interval_seconds: default_refresh_interval(),
            base_branch: default_base_branch(),
            test_command: String::new(),
            launch_mode: LaunchMode::default(),
            bundled_binary_root: default_bundled_binary_root(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize blank paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Refresh interval as a [`Duration`].
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Path of the server binary shipped with the plugin for this platform.
    #[must_use]
    pub fn resolve_bundled_binary_path(&self) -> PathBuf {
        let platform = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", _) => "windows-x64",
            ("macos", "aarch64" | "arm") => "macos-arm64",
            ("macos", _) => "macos-x64",
            ("linux" | "freebsd" | "netbsd" | "openbsd", _) => "linux-x64",
            (os, arch) => {
                warn!(os, arch, "unknown platform, defaulting to linux-x64");
                "linux-x64"
            }
        };
        let binary_name = if cfg!(windows) {
            "orchestragent.exe"
        } else {
            "orchestragent"
        };

        let path = self
            .bundled_binary_root
            .join("bin")
            .join(platform)
            .join(binary_name);
        info!(platform, path = %path.display(), "resolved bundled binary path");
        path
    }

    /// The custom server path when configured, otherwise the bundled one.
    #[must_use]
    pub fn resolve_server_binary_path(&self) -> PathBuf {
        if let Some(custom) = &self.mcp_server_path {
            info!(path = %custom.display(), "using custom MCP server path");
            custom.clone()
        } else {
            self.resolve_bundled_binary_path()
        }
    }

    /// Build the server [`LaunchSpec`] according to `launch_mode`.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(self.resolve_server_binary_path());
        if let Some(repository) = &self.repository_path {
            match self.launch_mode {
                LaunchMode::Argument => {
                    spec = spec
                        .arg("--repository")
                        .arg(repository.to_string_lossy().into_owned());
                }
                LaunchMode::WorkingDirectory => {
                    spec = spec.current_dir(repository.clone());
                }
            }
        }
        spec
    }

    fn validate(&mut self) -> Result<()> {
        self.mcp_server_path = self.mcp_server_path.take().filter(|p| !is_blank_path(p));
        self.repository_path = self.repository_path.take().filter(|p| !is_blank_path(p));

        if self.refresh_interval_seconds == 0 {
            return Err(AppError::Config(
                "refresh_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.connection.max_retries == 0 {
            return Err(AppError::Config(
                "connection.max_retries must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Check that `path` names an existing, regular, executable file.
///
/// Each failed check is logged at `WARN` with the reason.
#[must_use]
pub fn validate_binary_path(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        warn!(path = %path.display(), "binary path does not exist");
        return false;
    };

    if !metadata.is_file() {
        warn!(path = %path.display(), "binary path is not a regular file");
        return false;
    }

    if !is_executable(&metadata) {
        warn!(path = %path.display(), "binary path is not executable");
        return false;
    }

    true
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

fn is_blank_path(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
