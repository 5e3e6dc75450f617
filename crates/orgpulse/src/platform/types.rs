use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Rate limit information reported by the upstream on every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per window.
    pub limit: usize,
    /// Remaining requests in current window.
    pub remaining: usize,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

/// A repository within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Upstream numeric ID.
    pub id: u64,
    /// Repository name.
    pub name: String,
    /// Fully-qualified name (`org/name`).
    pub full_name: String,
    /// Default branch name, if the upstream reports one.
    #[serde(default)]
    pub default_branch: Option<String>,
    /// When code was last pushed.
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// A branch and the sha of its head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub head_sha: String,
}

/// Who authored a commit.
///
/// Commits linked to an upstream account are keyed by login; everything else
/// falls back to the free-text author name from the commit itself. The two
/// spaces are never reconciled, so the same person may show up once under each
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorIdentity {
    /// Linked upstream account.
    Known { login: String },
    /// Free-text author name (and email, if any) with no linked account.
    Unattributed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
}

impl AuthorIdentity {
    /// The login for linked accounts.
    pub fn login(&self) -> Option<&str> {
        match self {
            Self::Known { login } => Some(login),
            Self::Unattributed { .. } => None,
        }
    }
}

impl fmt::Display for AuthorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { login } => write!(f, "{login}"),
            Self::Unattributed { name, .. } => write!(f, "{name} (unlinked)"),
        }
    }
}

/// A commit as observed upstream. Identified by sha; immutable once seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author: AuthorIdentity,
    pub authored_at: DateTime<Utc>,
    pub message: String,
    /// Parent shas, in upstream order.
    pub parents: Vec<String>,
}

/// Optional `since`/`until` bounds for commit listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }
}

/// Upstream client for the resources the sync engine consumes.
///
/// Implementations handle pagination, rate limiting and retries internally;
/// callers only see the concatenated collection or a typed error. The
/// credential is passed per call so one client can serve many tokens while
/// sharing rate-limit state per token.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// List every repository of an organization.
    async fn list_org_repos(&self, org: &str, auth: Option<&str>) -> Result<Vec<Repository>>;

    /// List every branch of a repository (`org/name`).
    async fn list_branches(&self, repo: &str, auth: Option<&str>) -> Result<Vec<Branch>>;

    /// List commits reachable from `head` (a commit sha or ref) within
    /// `window`.
    async fn list_commits(
        &self,
        repo: &str,
        head: &str,
        window: DateWindow,
        auth: Option<&str>,
    ) -> Result<Vec<Commit>>;

    /// List the logins of an organization's members.
    async fn list_org_members(&self, org: &str, auth: Option<&str>) -> Result<Vec<String>>;
}
