//! Error types shared across the client.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Server process start, stop, or stream acquisition failure.
    Process(String),
    /// JSON-RPC transport failure (connect, write, read, decode).
    Transport(String),
    /// The server answered with a JSON-RPC error object.
    Rpc(String),
    /// Domain value failed its construction invariants.
    Validation(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<ProcessStartError> for AppError {
    fn from(err: ProcessStartError) -> Self {
        Self::Process(err.to_string())
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Failure to launch the server process.
///
/// Carries the attempted binary path and the underlying OS error so the
/// host can tell "binary missing" apart from "permission denied".
#[derive(Debug)]
pub struct ProcessStartError {
    /// Binary that was being launched.
    pub binary: PathBuf,
    /// OS error reported by the spawn call.
    pub source: std::io::Error,
}

impl Display for ProcessStartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to start MCP server at {}: {}",
            self.binary.display(),
            self.source
        )
    }
}

impl std::error::Error for ProcessStartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Failure kinds of a single JSON-RPC exchange.
///
/// Each variant is a distinct outcome so callers can react differently to a
/// closed server, a garbled reply, and a broken pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The client was not connected; no I/O was attempted.
    NotConnected,
    /// The server closed its output before a reply line arrived.
    Closed,
    /// The request could not be encoded or the reply line was not a valid
    /// JSON-RPC response.
    MalformedPayload(String),
    /// Reading from or writing to the server streams failed.
    Io(String),
    /// No reply arrived within the configured request timeout.
    Timeout,
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to MCP server"),
            Self::Closed => write!(f, "MCP server closed the stream"),
            Self::MalformedPayload(detail) => write!(f, "malformed payload: {detail}"),
            Self::Io(detail) => write!(f, "stream i/o failed: {detail}"),
            Self::Timeout => write!(f, "timed out waiting for MCP server reply"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
