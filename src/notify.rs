//! Host notification seam.
//!
//! The client reports user-visible outcomes (connected, start failed, tool
//! error) through [`Notifier`]. Hosts with a notification surface implement
//! the trait; [`TracingNotifier`] turns notifications into log records.

use tracing::{error, info, warn};

/// Severity of a host notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Informational, e.g. "Connected to MCP server".
    Info,
    /// Needs attention but nothing failed yet.
    Warning,
    /// An operation failed.
    Error,
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    fn notify(&self, level: NotificationLevel, title: &str, message: &str);

    /// Deliver an informational notification.
    fn info(&self, title: &str, message: &str) {
        self.notify(NotificationLevel::Info, title, message);
    }

    /// Deliver a warning notification.
    fn warning(&self, title: &str, message: &str) {
        self.notify(NotificationLevel::Warning, title, message);
    }

    /// Deliver an error notification.
    fn error(&self, title: &str, message: &str) {
        self.notify(NotificationLevel::Error, title, message);
    }
}

/// [`Notifier`] that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotificationLevel, title: &str, message: &str) {
        match level {
            NotificationLevel::Info => info!(title, message, "notification"),
            NotificationLevel::Warning => warn!(title, message, "notification"),
            NotificationLevel::Error => error!(title, message, "notification"),
        }
    }
}
