//! GitHub REST client.
//!
//! A thin layer over [`HttpTransport`]: one method issues a single page
//! request, applies the per-credential rate limiter and returns the decoded
//! items with the `Link` and rate-limit headers already parsed. Pagination and
//! retries are layered on top in [`super::pagination`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpRequest, HttpTransport, header_get};
use crate::platform::{
    self, Branch, Commit, DateWindow, PlatformClient, RateLimitInfo, RateLimitRegistry,
    Repository,
};
use crate::retry::RetryPolicy;

use super::convert::{to_branch, to_commit, to_member, to_repository};
use super::error::GitHubError;
use super::pagination::{PaginatedFetchConfig, PaginationConfig};
use super::types::{GitHubBranch, GitHubCommit, GitHubRepo, GitHubUser};

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version pinned in every request.
const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("orgpulse/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Links parsed from a `Link` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    /// URL of the next page (`rel="next"`).
    pub next: Option<String>,
}

/// Parse a GitHub `Link` header.
///
/// Format: `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut links = LinkPagination::default();

    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if let Some(inner) = segment
                .strip_prefix('<')
                .and_then(|s| s.strip_suffix('>'))
            {
                url = Some(inner);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some("next")) = (url, rel) {
            links.next = Some(url.to_string());
        }
    }

    links
}

/// Extract rate-limit info from GitHub response headers.
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let remaining = header_get(headers, "x-ratelimit-remaining")?
        .trim()
        .parse::<usize>()
        .ok()?;
    let reset_epoch = header_get(headers, "x-ratelimit-reset")?
        .trim()
        .parse::<i64>()
        .ok()?;
    let limit = header_get(headers, "x-ratelimit-limit")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(remaining);
    let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

/// One decoded page of a listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// URL of the following page, if the upstream advertised one.
    pub next_url: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
}

/// GitHub client implementing [`PlatformClient`].
///
/// Cheap to clone; clones share the transport and the rate-limit registry.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    registry: RateLimitRegistry,
    pub(super) retry: RetryPolicy,
    pub(super) pagination: PaginationConfig,
}

impl GitHubClient {
    /// Create a client talking to `api_url` over HTTPS.
    pub fn new(api_url: &str, registry: RateLimitRegistry) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| GitHubError::Http(e.to_string()))?;
        Ok(Self::new_with_transport(
            api_url,
            Arc::new(transport),
            registry,
        ))
    }

    pub fn new_with_transport(
        api_url: &str,
        transport: Arc<dyn HttpTransport>,
        registry: RateLimitRegistry,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            registry,
            retry: RetryPolicy::default(),
            pagination: PaginationConfig::default(),
        }
    }

    /// Replace the retry policy for transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the pagination limits.
    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn registry(&self) -> &RateLimitRegistry {
        &self.registry
    }

    /// Fetch and decode a single page.
    ///
    /// Waits on the credential's limiter before sending and records the quota
    /// reported by the response, so a nearly exhausted quota delays the next
    /// request for the same credential until the reported reset.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Option<&str>,
    ) -> Result<Page<T>, GitHubError> {
        let limiter = self.registry.for_credential(auth);
        limiter.wait().await;

        let mut headers: HttpHeaders = vec![
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
        ];
        if let Some(token) = auth {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        let response = self
            .transport
            .send(HttpRequest {
                url: url.to_string(),
                headers,
            })
            .await
            .map_err(|e| GitHubError::Http(e.to_string()))?;

        let rate_limit = parse_rate_limit_headers(&response.headers);
        if let Some(ref info) = rate_limit
            && let Some(wait) = limiter.observe(info)
        {
            tracing::debug!(
                remaining = info.remaining,
                wait_secs = wait.as_secs(),
                "Quota nearly exhausted, holding requests until reset"
            );
        }

        if !(200..300).contains(&response.status) {
            let message = String::from_utf8_lossy(&response.body).to_string();
            return Err(GitHubError::Api {
                status: response.status,
                message,
                rate_limit,
            });
        }

        let items: Vec<T> = serde_json::from_slice(&response.body)?;
        let next_url = response
            .header("link")
            .and_then(|h| parse_link_header(h).next);

        Ok(Page {
            items,
            next_url,
            rate_limit,
        })
    }
}

#[async_trait]
impl PlatformClient for GitHubClient {
    async fn list_org_repos(
        &self,
        org: &str,
        auth: Option<&str>,
    ) -> platform::Result<Vec<Repository>> {
        let repos: Vec<GitHubRepo> = self
            .fetch_all(&PaginatedFetchConfig::org_repos(org), auth)
            .await?;
        Ok(repos.into_iter().map(to_repository).collect())
    }

    async fn list_branches(&self, repo: &str, auth: Option<&str>) -> platform::Result<Vec<Branch>> {
        let branches: Vec<GitHubBranch> = self
            .fetch_all(&PaginatedFetchConfig::branches(repo), auth)
            .await?;
        Ok(branches.into_iter().map(to_branch).collect())
    }

    async fn list_commits(
        &self,
        repo: &str,
        head: &str,
        window: DateWindow,
        auth: Option<&str>,
    ) -> platform::Result<Vec<Commit>> {
        let config = PaginatedFetchConfig::commits(repo, head, window);
        let commits: Vec<GitHubCommit> = self.fetch_all(&config, auth).await?;
        commits
            .into_iter()
            .map(|c| to_commit(c, &config.resource))
            .collect()
    }

    async fn list_org_members(
        &self,
        org: &str,
        auth: Option<&str>,
    ) -> platform::Result<Vec<String>> {
        let members: Vec<GitHubUser> = self
            .fetch_all(&PaginatedFetchConfig::org_members(org), auth)
            .await?;
        Ok(members.into_iter().map(to_member).collect())
    }
}
