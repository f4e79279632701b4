//! Local session cache refreshed from the MCP server.
//!
//! The cache keeps a map from session id to [`Session`] and publishes the
//! full, ordered session list through a [`watch`] channel after every change.
//! Subscribers see the current list immediately and every later replacement;
//! there are no partial diffs.
//!
//! # Refresh policy
//!
//! - A refresh that fails (transport error, JSON-RPC error, no session list
//!   in the result) leaves the cache untouched.
//! - A successful refresh replaces the whole map; it never merges.
//! - Malformed entries are dropped one by one, see [`parse_session_entry`].
//!
//! # Locking
//!
//! `refresh`, `update`, and `remove` take the write gate for their whole
//! duration (including the RPC round trip), so a local update issued while a
//! refresh is in flight lands after the refresh instead of being discarded.
//! Reads only take the map's read lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::session::{GitStatistics, Session, SessionStatus};
use crate::orchestrator::client::ToolCaller;
use crate::{AppError, Result};

/// Tool that lists the server's sessions.
pub const GET_SESSIONS_TOOL: &str = "get_sessions";

/// Concurrent session cache with an observable snapshot.
pub struct SessionCache {
    caller: Arc<dyn ToolCaller>,
    sessions: RwLock<HashMap<String, Session>>,
    write_gate: Mutex<()>,
    snapshot: watch::Sender<Vec<Session>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("snapshot_len", &self.snapshot.borrow().len())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Create an empty cache that refreshes through `caller`.
    #[must_use]
    pub fn new(caller: Arc<dyn ToolCaller>) -> Self {
        let (snapshot, _initial_rx) = watch::channel(Vec::new());
        Self {
            caller,
            sessions: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
            snapshot,
        }
    }

    /// Populate the cache once at startup. Same as [`refresh`](Self::refresh).
    ///
    /// # Errors
    ///
    /// See [`refresh`](Self::refresh).
    pub async fn initialize_from_server(&self) -> Result<usize> {
        info!("initializing session list from MCP server");
        self.refresh().await
    }

    /// Replace the cache with the server's current session list.
    ///
    /// Returns the number of cached sessions.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport`: the `get_sessions` exchange failed or the
    ///   result held no session list.
    /// - `AppError::Rpc`: the server answered with a JSON-RPC error.
    ///
    /// The cache is unchanged in every error case.
    pub async fn refresh(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        info!("refreshing sessions from MCP server");

        let response = self
            .caller
            .call_tool(GET_SESSIONS_TOOL, HashMap::new())
            .await
            .map_err(|err| {
                error!(%err, "failed to refresh sessions");
                AppError::from(err)
            })?;

        if let Some(rpc_error) = response.error {
            error!(
                code = rpc_error.code,
                message = %rpc_error.message,
                "failed to refresh sessions"
            );
            return Err(AppError::Rpc(format!(
                "{GET_SESSIONS_TOOL} failed: {}",
                rpc_error.message
            )));
        }

        let Some(entries) = response.result.and_then(session_entries) else {
            warn!("get_sessions result holds no session list, keeping cached sessions");
            return Err(AppError::Transport(format!(
                "{GET_SESSIONS_TOOL} returned no session list"
            )));
        };

        let parsed: Vec<Session> = entries.iter().filter_map(parse_session_entry).collect();
        let dropped = entries.len().saturating_sub(parsed.len());

        let count = {
            let mut map = self.sessions.write().await;
            map.clear();
            for session in parsed {
                map.insert(session.id().to_owned(), session);
            }
            self.publish(&map);
            map.len()
        };

        info!(count, dropped, "refreshed sessions from MCP server");
        Ok(count)
    }

    /// All cached sessions, in no particular order.
    pub async fn get_all(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// The cached session with `id`, if any.
    pub async fn get_by_id(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Insert or replace `session` locally, without a server round trip.
    pub async fn update(&self, session: Session) {
        let _gate = self.write_gate.lock().await;
        let id = session.id().to_owned();
        {
            let mut map = self.sessions.write().await;
            map.insert(id.clone(), session);
            self.publish(&map);
        }
        info!(session_id = %id, "updated session");
    }

    /// Remove the session with `id` locally. Returns the removed value.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        let _gate = self.write_gate.lock().await;
        let removed = {
            let mut map = self.sessions.write().await;
            let removed = map.remove(id);
            self.publish(&map);
            removed
        };
        info!(session_id = id, found = removed.is_some(), "removed session");
        removed
    }

    /// Subscribe to the session snapshot. The receiver holds the current
    /// list immediately.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Session>> {
        self.snapshot.subscribe()
    }

    /// Copy of the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Session> {
        self.snapshot.borrow().clone()
    }

    /// Spawn a task that refreshes every `interval` until `cancel` fires.
    ///
    /// Failed refreshes are logged and retried at the next tick.
    #[must_use]
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("session refresh loop shutting down");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }

                if let Err(err) = cache.refresh().await {
                    warn!(%err, "background session refresh failed");
                }
            }
        })
    }

    /// Publish the map as a snapshot ordered by creation time, then id.
    fn publish(&self, map: &HashMap<String, Session>) {
        let mut list: Vec<Session> = map.values().cloned().collect();
        list.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        self.snapshot.send_replace(list);
    }
}

/// Extract the session entries from a `get_sessions` result.
///
/// Accepts a bare array, an object with a `sessions` array, or an MCP tool
/// result whose `content` holds a text block encoding either of those.
fn session_entries(result: Value) -> Option<Vec<Value>> {
    match result {
        Value::Array(items) => Some(items),
        Value::Object(mut obj) => {
            if let Some(Value::Array(items)) = obj.remove("sessions") {
                return Some(items);
            }
            let Some(Value::Array(blocks)) = obj.remove("content") else {
                return None;
            };
            blocks.into_iter().find_map(|block| {
                let text = block.get("text").and_then(Value::as_str)?;
                match serde_json::from_str::<Value>(text).ok()? {
                    Value::Array(items) => Some(items),
                    Value::Object(mut inner) => match inner.remove("sessions") {
                        Some(Value::Array(items)) => Some(items),
                        _ => None,
                    },
                    _ => None,
                }
            })
        }
        _ => None,
    }
}

/// Parse one wire entry into a [`Session`].
///
/// - `id`, `worktreePath`, `branchName` are required; an entry missing any
///   of them is dropped.
/// - `status` defaults to `OPEN` when absent or unknown.
/// - `linesAdded`, `linesRemoved`, `filesChanged` default to 0 when absent,
///   negative, or unparsable.
/// - `createdAt`, `lastModified` (RFC 3339) default to now when absent or
///   malformed.
/// - An entry that still violates the [`Session`] invariants is dropped.
#[must_use]
pub fn parse_session_entry(entry: &Value) -> Option<Session> {
    let Some(obj) = entry.as_object() else {
        warn!("dropping session entry: not a JSON object");
        return None;
    };

    let (Some(id), Some(worktree_path), Some(branch_name)) = (
        primitive_text(obj, "id"),
        primitive_text(obj, "worktreePath"),
        primitive_text(obj, "branchName"),
    ) else {
        warn!(entry = %entry, "dropping session entry missing a required field");
        return None;
    };

    let status = primitive_text(obj, "status")
        .and_then(|raw| raw.parse::<SessionStatus>().ok())
        .unwrap_or_default();
    let statistics = GitStatistics::new(
        count(obj, "linesAdded"),
        count(obj, "linesRemoved"),
        count(obj, "filesChanged"),
    );

    let now = Utc::now();
    let created_at = timestamp(obj, "createdAt").unwrap_or(now);
    let last_modified = timestamp(obj, "lastModified").unwrap_or(now);

    match Session::new(
        id,
        worktree_path,
        branch_name,
        status,
        statistics,
        created_at,
        last_modified,
    ) {
        Ok(session) => Some(session),
        Err(err) => {
            warn!(%err, entry = %entry, "dropping invalid session entry");
            None
        }
    }
}

/// Text content of a JSON primitive field (strings verbatim, numbers and
/// booleans rendered).
fn primitive_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn count(obj: &Map<String, Value>, key: &str) -> u32 {
    primitive_text(obj, key)
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

fn timestamp(obj: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = primitive_text(obj, key)?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            debug!(field = key, value = %raw, %err, "malformed timestamp, defaulting to now");
            None
        }
    }
}
