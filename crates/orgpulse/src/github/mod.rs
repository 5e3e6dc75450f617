//! GitHub implementation of the paged fetcher.
//!
//! # Module Structure
//!
//! - [`error`] - Per-request errors and their mapping to [`PlatformError`](crate::platform::PlatformError)
//! - [`types`] - REST response shapes
//! - [`client`] - Single-page requests, `Link` and rate-limit header parsing
//! - [`pagination`] - Listing loop with stop conditions, rate-limit sleeps and retries
//! - [`convert`] - Conversion to engine types
//!
//! ```ignore
//! use orgpulse::github::{GitHubClient, DEFAULT_API_URL};
//! use orgpulse::platform::{PlatformClient, RateLimitRegistry};
//!
//! let client = GitHubClient::new(DEFAULT_API_URL, RateLimitRegistry::default())?;
//! let repos = client.list_org_repos("acme", Some(&token)).await?;
//! ```

mod client;
mod convert;
mod error;
mod pagination;
mod types;

pub use error::GitHubError;

pub use client::{
    DEFAULT_API_URL, GitHubClient, LinkPagination, Page, parse_link_header,
    parse_rate_limit_headers,
};

pub use pagination::{
    DEFAULT_MAX_CONSECUTIVE_EMPTY, DEFAULT_MAX_PAGES, DEFAULT_MAX_RATE_LIMIT_WAITS,
    DEFAULT_PER_PAGE, PaginatedFetchConfig, PaginationConfig,
};

pub use types::{GitHubBranch, GitHubCommit, GitHubRepo, GitHubUser};
