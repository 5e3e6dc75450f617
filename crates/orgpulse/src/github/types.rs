//! GitHub REST response shapes.
//!
//! Only the fields the sync engine consumes are modelled; everything else in
//! the payload is ignored by serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: GitHubCommitRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitRef {
    pub sha: String,
}

/// An item of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
    /// Linked account; `null` when the author email is not tied to a user.
    #[serde(default)]
    pub author: Option<GitHubUser>,
    #[serde(default)]
    pub parents: Vec<GitHubCommitRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitDetail {
    #[serde(default)]
    pub author: Option<GitHubGitActor>,
    #[serde(default)]
    pub committer: Option<GitHubGitActor>,
    #[serde(default)]
    pub message: String,
}

/// Git-level author/committer signature.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubGitActor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}
