//! Upstream-agnostic types and the client trait the sync engine consumes.
//!
//! # Example
//!
//! ```ignore
//! use orgpulse::platform::{PlatformClient, PlatformError};
//!
//! async fn count_repos<C: PlatformClient>(client: &C, org: &str) -> Result<usize, PlatformError> {
//!     let repos = client.list_org_repos(org, None).await?;
//!     Ok(repos.len())
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{PlatformError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, CredentialLimiter, RateLimitRegistry, rate_limits};
pub use types::{
    AuthorIdentity, Branch, Commit, DateWindow, PlatformClient, RateLimitInfo, Repository,
};

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_platform_error_not_found() {
        let err = PlatformError::not_found("commits for acme/api");
        assert_eq!(err.to_string(), "Not found: commits for acme/api");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_platform_error_rate_limited() {
        let err = PlatformError::RateLimited {
            reset_at: Utc::now(),
        };
        assert!(err.to_string().contains("Rate limit"));
        assert!(err.is_rate_limited());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_platform_error_network() {
        let err = PlatformError::network("branches for acme/api", "connection refused");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("branches for acme/api"));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_platform_error_upstream_server_is_transient() {
        let err = PlatformError::UpstreamServer {
            status: 502,
            resource: "repositories for acme".to_string(),
        };
        assert!(err.is_transient());
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_platform_error_internal() {
        let err = PlatformError::internal("unexpected state");
        assert!(err.to_string().contains("Internal error"));
        assert!(err.to_string().contains("unexpected state"));
    }

    #[test]
    fn test_short_error_message_single_line() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(short_error_message(&err), "file not found");
    }

    #[test]
    fn test_short_error_message_multiline() {
        let err = std::io::Error::other("first line\nsecond line\nthird line");
        assert_eq!(short_error_message(&err), "first line");
    }

    #[test]
    fn test_author_identity_display_and_login() {
        let known = AuthorIdentity::Known {
            login: "octocat".to_string(),
        };
        let unlinked = AuthorIdentity::Unattributed {
            name: "Mona".to_string(),
            email: None,
        };
        assert_eq!(known.to_string(), "octocat");
        assert_eq!(known.login(), Some("octocat"));
        assert_eq!(unlinked.to_string(), "Mona (unlinked)");
        assert_eq!(unlinked.login(), None);
    }

    #[test]
    fn test_author_identity_serializes_with_kind_tag() {
        let known = AuthorIdentity::Known {
            login: "octocat".to_string(),
        };
        let json = serde_json::to_value(&known).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "known", "login": "octocat"}));

        let unlinked: AuthorIdentity =
            serde_json::from_value(serde_json::json!({"kind": "unattributed", "name": "Mona"}))
                .unwrap();
        assert_eq!(
            unlinked,
            AuthorIdentity::Unattributed {
                name: "Mona".to_string(),
                email: None
            }
        );
    }

    #[test]
    fn test_rate_limits_constants() {
        assert_eq!(rate_limits::GITHUB_DEFAULT_RPS, 10);
        assert_eq!(rate_limits::LOW_QUOTA_THRESHOLD, 1);
    }

    #[test]
    fn test_api_rate_limiter_clone() {
        let limiter = ApiRateLimiter::new(10);
        let _cloned = limiter.clone();
    }
}
