//! Sync request/outcome types and defaults.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::platform::{Commit, DateWindow, PlatformError};
use crate::stats::UserStats;

/// Repositories processed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Look-back used when neither the request nor a watermark bounds `since`.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Options for an orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Repositories per batch (also the concurrency bound).
    pub batch_size: usize,
    /// Delay before each batch after the first.
    pub batch_delay: Duration,
    /// Default look-back when no `since` is known.
    pub lookback: chrono::Duration,
    /// Restrict statistics to linked authors who are organization members.
    pub members_only: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            lookback: chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
            members_only: false,
        }
    }
}

/// One synchronization run.
#[derive(Clone, Default)]
pub struct SyncRequest {
    pub org: String,
    pub credential: Option<String>,
    pub window: DateWindow,
    /// Repository names (`name` or `org/name`) to restrict the run to.
    /// Empty means every repository.
    pub repo_filter: Vec<String>,
}

impl SyncRequest {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_repo_filter(mut self, repos: Vec<String>) -> Self {
        self.repo_filter = repos;
        self
    }
}

// Never print the credential.
impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("org", &self.org)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("window", &self.window)
            .field("repo_filter", &self.repo_filter)
            .finish()
    }
}

/// A commit together with the repository it came from and the branches
/// that reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedCommit {
    pub repository: String,
    #[serde(flatten)]
    pub commit: Commit,
    pub branches: BTreeSet<String>,
}

/// A repository that could not be synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoFailure {
    pub repository: String,
    pub error: String,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub org: String,
    /// Newly observed commits, newest first.
    pub commits: Vec<SyncedCommit>,
    pub user_stats: UserStats,
    pub repositories_synced: usize,
    pub failed_repositories: Vec<RepoFailure>,
    /// Effective lower bound used for commit listings.
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Watermark after this run.
    pub watermark: Option<DateTime<Utc>>,
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    FetchingRepos,
    FetchingCommits,
    Aggregating,
    Complete,
    Errored,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::FetchingRepos => "fetching repositories",
            SyncPhase::FetchingCommits => "fetching commits",
            SyncPhase::Aggregating => "aggregating",
            SyncPhase::Complete => "complete",
            SyncPhase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Organization-level failure of a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Organization {org} has no repositories to synchronize")]
    EmptyOrganization { org: String },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl SyncError {
    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::EmptyOrganization { org } => {
                format!("No repositories found for organization '{org}'.")
            }
            SyncError::Platform(err) => match err {
                PlatformError::NotFound { resource } => {
                    format!("Could not find {resource}. Check the name and that your token can see it.")
                }
                PlatformError::Unauthorized { resource } => format!(
                    "Access to {resource} was denied. Check that the token is valid and has the repo and read:org scopes."
                ),
                PlatformError::RateLimited { reset_at } => format!(
                    "The GitHub rate limit is exhausted. Try again after {}.",
                    reset_at.format("%H:%M:%S UTC")
                ),
                PlatformError::UpstreamServer { status, .. } => {
                    format!("GitHub is having trouble (HTTP {status}). Try again later.")
                }
                PlatformError::Network { message, .. } => {
                    format!("Could not reach GitHub: {message}")
                }
                PlatformError::Decode { resource, .. } => {
                    format!("GitHub returned an unexpected response for {resource}.")
                }
                PlatformError::Api {
                    status, resource, ..
                } => format!("GitHub rejected the request for {resource} (HTTP {status})."),
                PlatformError::Internal { message } => format!("Internal error: {message}"),
            },
        }
    }
}
