//! Paginated listing over the GitHub REST API.
//!
//! A listing follows `Link: rel="next"` until one of the stop conditions in
//! [`PaginationConfig`] is met. Every page goes through the credential's rate
//! limiter and the client's [`RetryPolicy`](crate::retry::RetryPolicy); an
//! exhausted quota parks the listing until the upstream reset and then asks
//! for the same page again without touching the retry budget.

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;

use crate::platform::{self, DateWindow, PlatformError};

use super::client::GitHubClient;

/// Items requested per page.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Hard ceiling on pages fetched for one listing.
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Consecutive empty pages tolerated when empty pages do not stop a listing.
pub const DEFAULT_MAX_CONSECUTIVE_EMPTY: u32 = 3;

/// Rate-limit sleeps tolerated for a single page before giving up.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 5;

/// Stop conditions and sizing for paginated listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    pub per_page: u32,
    pub max_pages: u32,
    pub max_consecutive_empty: u32,
    /// Stop at the first empty page. When false, only
    /// `max_consecutive_empty` empty pages in a row end the listing.
    pub stop_on_empty_page: bool,
    pub max_rate_limit_waits: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            max_consecutive_empty: DEFAULT_MAX_CONSECUTIVE_EMPTY,
            stop_on_empty_page: true,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        }
    }
}

/// Endpoint description for a paginated listing.
#[derive(Debug, Clone)]
pub struct PaginatedFetchConfig {
    /// API path below the root, without a leading slash.
    pub path: String,
    /// Query parameters besides `per_page`.
    pub query: Vec<(String, String)>,
    /// Context used in errors and log lines, e.g. `commits for org/repo`.
    pub resource: String,
}

impl PaginatedFetchConfig {
    /// Repositories of an organization.
    pub fn org_repos(org: &str) -> Self {
        Self {
            path: format!("orgs/{org}/repos"),
            query: Vec::new(),
            resource: format!("repositories for {org}"),
        }
    }

    /// Branches of a repository.
    pub fn branches(repo: &str) -> Self {
        Self {
            path: format!("repos/{repo}/branches"),
            query: Vec::new(),
            resource: format!("branches for {repo}"),
        }
    }

    /// Commits reachable from `head`, bounded by `window`.
    pub fn commits(repo: &str, head: &str, window: DateWindow) -> Self {
        let mut query = vec![("sha".to_string(), head.to_string())];
        if let Some(since) = window.since {
            query.push((
                "since".to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(until) = window.until {
            query.push((
                "until".to_string(),
                until.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        Self {
            path: format!("repos/{repo}/commits"),
            query,
            resource: format!("commits for {repo}"),
        }
    }

    /// Members of an organization.
    pub fn org_members(org: &str) -> Self {
        Self {
            path: format!("orgs/{org}/members"),
            query: Vec::new(),
            resource: format!("members of {org}"),
        }
    }

    /// URL of the first page.
    pub fn first_url(&self, api_url: &str, per_page: u32) -> platform::Result<String> {
        let base = format!("{}/{}", api_url.trim_end_matches('/'), self.path);
        let per_page = per_page.to_string();
        let params = std::iter::once(("per_page", per_page.as_str()))
            .chain(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        reqwest::Url::parse_with_params(&base, params)
            .map(String::from)
            .map_err(|e| PlatformError::internal(format!("invalid URL {base}: {e}")))
    }
}

impl GitHubClient {
    /// Fetch every page of a listing and concatenate the items.
    pub async fn fetch_all<T>(
        &self,
        config: &PaginatedFetchConfig,
        auth: Option<&str>,
    ) -> platform::Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let limits = &self.pagination;
        let mut next = Some(config.first_url(self.api_url(), limits.per_page)?);
        let mut items = Vec::new();
        let mut pages = 0u32;
        let mut consecutive_empty = 0u32;
        let mut remaining = None;

        while let Some(url) = next.take() {
            if pages >= limits.max_pages {
                tracing::debug!(
                    resource = %config.resource,
                    pages,
                    "Page ceiling reached, stopping listing"
                );
                break;
            }

            let page = self.fetch_page::<T>(&url, auth, &config.resource).await?;
            pages += 1;
            if let Some(info) = page.rate_limit {
                remaining = Some(info.remaining);
            }

            let count = page.items.len();
            items.extend(page.items);

            if count == 0 {
                consecutive_empty += 1;
                if limits.stop_on_empty_page || consecutive_empty >= limits.max_consecutive_empty
                {
                    break;
                }
            } else {
                consecutive_empty = 0;
            }

            next = page.next_url;
        }

        tracing::debug!(
            resource = %config.resource,
            pages,
            items = items.len(),
            remaining = ?remaining,
            "Listing complete"
        );

        Ok(items)
    }

    /// Fetch one page, sleeping through rate limits and retrying transient
    /// failures.
    async fn fetch_page<T>(
        &self,
        url: &str,
        auth: Option<&str>,
        resource: &str,
    ) -> platform::Result<super::client::Page<T>>
    where
        T: DeserializeOwned + Send,
    {
        let limiter = self.registry().for_credential(auth);
        let mut rate_limit_waits = 0u32;

        loop {
            let result = self
                .retry
                .run(resource, move || async move {
                    self.get_page::<T>(url, auth)
                        .await
                        .map_err(|e| e.into_platform(resource))
                })
                .await;

            match result {
                Err(PlatformError::RateLimited { reset_at })
                    if rate_limit_waits < self.pagination.max_rate_limit_waits =>
                {
                    rate_limit_waits += 1;
                    let wait = limiter.block_until(reset_at)?;
                    tracing::warn!(
                        resource,
                        wait_secs = wait.as_secs(),
                        reset_at = %reset_at,
                        "Rate limited, waiting for reset"
                    );
                }
                other => return other,
            }
        }
    }
}
