//! Composite cache keys.
//!
//! Listings that depend on who is asking are scoped by `auth`/`anon` so an
//! anonymous run never reads results fetched with a token (private repos) and
//! vice versa. The credential itself never appears in a key.

use chrono::SecondsFormat;

use crate::platform::DateWindow;

fn scope(auth: Option<&str>) -> &'static str {
    if auth.is_some() { "auth" } else { "anon" }
}

/// `{org}:{auth|anon}`
pub fn repositories(org: &str, auth: Option<&str>) -> String {
    format!("{org}:{}", scope(auth))
}

/// `{repoFullName}:{auth|anon}`
pub fn branches(repo: &str, auth: Option<&str>) -> String {
    format!("{repo}:{}", scope(auth))
}

/// `{repoFullName}/{branch}@{headSha}/{since}/{until}`
///
/// The listing is anchored on the head commit, so a branch that moved gets a
/// new key. Open bounds render as `start` and `head`.
pub fn commits(repo: &str, branch: &str, head_sha: &str, window: DateWindow) -> String {
    let since = window
        .since
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "start".to_string());
    let until = window
        .until
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "head".to_string());
    format!("{repo}/{branch}@{head_sha}/{since}/{until}")
}

/// `{org}:{auth|anon}`
pub fn employees(org: &str, auth: Option<&str>) -> String {
    format!("{org}:{}", scope(auth))
}
