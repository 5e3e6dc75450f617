//! Orgpulse - commit history sync and cache engine for GitHub organizations.
//!
//! The library lists an organization's repositories, their branches and the
//! commits on each branch, works out which branches reach every commit, and
//! folds the result into per-author statistics. Upstream listings are cached
//! on disk with per-category TTLs and a byte ceiling, and runs are incremental
//! through a per-organization watermark.
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
//! let cache = CacheStore::open(CacheConfig::at("orgpulse-cache.json")).await;
//! let orchestrator = SyncOrchestrator::new(
//!     client,
//!     cache,
//!     WatermarkStore::in_memory(),
//!     SyncOptions::default(),
//! );
//!
//! let outcome = orchestrator
//!     .synchronize(SyncRequest::new("acme").with_credential(token), None)
//!     .await?;
//! for (author, stats) in outcome.user_stats.ranked() {
//!     println!("{author}: {}", stats.total_commits);
//! }
//! ```

pub mod branches;
pub mod cache;
pub mod github;
pub mod http;
pub mod platform;
pub mod retry;
pub mod stats;
pub mod sync;

pub use cache::{CacheConfig, CacheError, CacheStore, DataSource};
pub use github::{GitHubClient, GitHubError};
pub use platform::{
    ApiRateLimiter, AuthorIdentity, Branch, Commit, DateWindow, PlatformClient, PlatformError,
    RateLimitInfo, RateLimitRegistry, Repository, rate_limits,
};
pub use stats::UserStats;
pub use sync::{SyncError, SyncOptions, SyncOrchestrator, SyncOutcome, SyncRequest};
