//! Progress events and cache status notifications for sync runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::SyncPhase;
use crate::cache::{CacheCategory, DataSource};

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The orchestrator moved to a new phase.
    PhaseChanged { org: String, phase: SyncPhase },

    /// Repository list is known (after filtering).
    ReposResolved {
        org: String,
        total: usize,
        source: DataSource,
    },

    /// Starting a batch of repositories.
    BatchStarted {
        /// 1-indexed batch number.
        batch: usize,
        batches: usize,
        size: usize,
    },

    /// A repository finished.
    RepositorySynced {
        repository: String,
        branches: usize,
        commits: usize,
    },

    /// A repository failed; the run continues without it.
    RepositoryFailed { repository: String, error: String },

    /// Non-fatal issue worth surfacing.
    Warning { message: String },

    /// The run finished.
    SyncComplete {
        org: String,
        repositories: usize,
        failed: usize,
        commits: usize,
    },

    /// The run aborted.
    SyncFailed { org: String, error: String },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

/// Latest cache lookup made by the orchestrator, published on a
/// `tokio::sync::watch` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub category: CacheCategory,
    pub org: String,
    pub timestamp: DateTime<Utc>,
    pub item_count: usize,
    pub source: DataSource,
}
