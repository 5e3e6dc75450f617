//! Organization sync.
//!
//! # Module Structure
//!
//! - [`types`] - Request, options and outcome types, defaults
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`watermark`] - Per-organization incremental sync watermarks
//! - [`engine`] - `SyncOrchestrator`, which drives a run end to end
//!
//! # Example
//!
//! ```ignore
//! use orgpulse::cache::{CacheConfig, CacheStore};
//! use orgpulse::github::{DEFAULT_API_URL, GitHubClient};
//! use orgpulse::platform::RateLimitRegistry;
//! use orgpulse::sync::{SyncOptions, SyncOrchestrator, SyncRequest, WatermarkStore};
//!
//! let client = GitHubClient::new(DEFAULT_API_URL, RateLimitRegistry::default())?;
//! let cache = CacheStore::open(CacheConfig::at("cache.json")).await;
//! let watermarks = WatermarkStore::open("watermarks.json").await;
//! let orchestrator = SyncOrchestrator::new(client, cache, watermarks, SyncOptions::default());
//! let outcome = orchestrator.synchronize(SyncRequest::new("acme"), None).await?;
//! ```

pub mod engine;
mod progress;
mod types;
mod watermark;

pub use engine::SyncOrchestrator;

pub use types::{
    RepoFailure, SyncError, SyncOptions, SyncOutcome, SyncPhase, SyncRequest, SyncedCommit,
};

pub use types::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_LOOKBACK_DAYS};

pub use progress::{CacheStatus, ProgressCallback, SyncProgress, emit};

pub use watermark::{OrgSyncState, WatermarkStore};
