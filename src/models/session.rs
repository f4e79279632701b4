//! Session model: a server-tracked git worktree/branch with change
//! statistics.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Review status of a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Work in progress.
    #[default]
    Open,
    /// Waiting for review.
    InReview,
    /// Merged into the base branch.
    Merged,
    /// Closed without merging.
    Closed,
}

impl SessionStatus {
    /// Wire name, e.g. `IN_REVIEW`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InReview => "IN_REVIEW",
            Self::Merged => "MERGED",
            Self::Closed => "CLOSED",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::Open, Self::InReview, Self::Merged, Self::Closed]
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Validation(format!("unknown session status: {s}")))
    }
}

/// Line and file change counts of a session's worktree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitStatistics {
    /// Lines added relative to the base branch.
    pub lines_added: u32,
    /// Lines removed relative to the base branch.
    pub lines_removed: u32,
    /// Files touched relative to the base branch.
    pub files_changed: u32,
}

impl GitStatistics {
    /// Bundle the three counters.
    #[must_use]
    pub fn new(lines_added: u32, lines_removed: u32, files_changed: u32) -> Self {
        Self {
            lines_added,
            lines_removed,
            files_changed,
        }
    }
}

/// Validated session value object.
///
/// Fields are private so the invariants checked by [`Session::new`] hold for
/// every instance: `id` and `branch_name` are not blank and `created_at` is
/// not after `last_modified`. Changes produce a new value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    worktree_path: PathBuf,
    branch_name: String,
    status: SessionStatus,
    statistics: GitStatistics,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl Session {
    /// Construct a session, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `id` or `branch_name` is blank, or
    /// `created_at` is after `last_modified`.
    pub fn new(
        id: impl Into<String>,
        worktree_path: impl Into<PathBuf>,
        branch_name: impl Into<String>,
        status: SessionStatus,
        statistics: GitStatistics,
        created_at: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        let branch_name = branch_name.into();

        if id.trim().is_empty() {
            return Err(AppError::Validation("session id must not be blank".into()));
        }
        if branch_name.trim().is_empty() {
            return Err(AppError::Validation("branch name must not be blank".into()));
        }
        if created_at > last_modified {
            return Err(AppError::Validation(
                "createdAt must not be after lastModified".into(),
            ));
        }

        Ok(Self {
            id,
            worktree_path: worktree_path.into(),
            branch_name,
            status,
            statistics,
            created_at,
            last_modified,
        })
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Worktree directory.
    #[must_use]
    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    /// Branch checked out in the worktree.
    #[must_use]
    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    /// Review status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Change statistics.
    #[must_use]
    pub fn statistics(&self) -> GitStatistics {
        self.statistics
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Copy with a new status.
    #[must_use]
    pub fn with_status(self, status: SessionStatus) -> Self {
        Self { status, ..self }
    }

    /// Copy with new statistics.
    #[must_use]
    pub fn with_statistics(self, statistics: GitStatistics) -> Self {
        Self { statistics, ..self }
    }

    /// Copy with a new modification time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `at` is before `created_at`.
    pub fn touched(self, at: DateTime<Utc>) -> Result<Self> {
        if at < self.created_at {
            return Err(AppError::Validation(
                "createdAt must not be after lastModified".into(),
            ));
        }
        Ok(Self {
            last_modified: at,
            ..self
        })
    }
}
