//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::platform::{PlatformError, RateLimitInfo};

/// Errors from a single GitHub request, before resource context is attached.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        rate_limit: Option<RateLimitInfo>,
    },
}

impl GitHubError {
    /// Reset time if this error signals an exhausted rate limit.
    ///
    /// GitHub reports primary limits as 403 with `x-ratelimit-remaining: 0`
    /// and secondary limits as 429; both count as rate limiting.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            GitHubError::Api {
                status: 429,
                rate_limit,
                ..
            } => Some(
                rate_limit
                    .as_ref()
                    .map(|r| r.reset_at)
                    .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1)),
            ),
            GitHubError::Api {
                status: 403,
                rate_limit: Some(info),
                ..
            } if info.remaining == 0 => Some(info.reset_at),
            _ => None,
        }
    }

    /// Attach resource context and map to the platform taxonomy.
    pub fn into_platform(self, resource: &str) -> PlatformError {
        if let Some(reset_at) = self.rate_limit_reset() {
            return PlatformError::RateLimited { reset_at };
        }

        match self {
            GitHubError::Http(message) => PlatformError::network(resource, message),
            GitHubError::Json(e) => PlatformError::Decode {
                resource: resource.to_string(),
                message: e.to_string(),
            },
            GitHubError::Api {
                status, message, ..
            } => match status {
                401 | 403 => PlatformError::unauthorized(resource),
                404 => PlatformError::not_found(resource),
                500..=599 => PlatformError::UpstreamServer {
                    status,
                    resource: resource.to_string(),
                },
                _ => PlatformError::Api {
                    status,
                    resource: resource.to_string(),
                    message,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, rate_limit: Option<RateLimitInfo>) -> GitHubError {
        GitHubError::Api {
            status,
            message: "boom".to_string(),
            rate_limit,
        }
    }

    fn quota(remaining: usize) -> RateLimitInfo {
        RateLimitInfo {
            limit: 5000,
            remaining,
            reset_at: Utc::now() + chrono::Duration::seconds(90),
        }
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        let resource = "commits for acme/api";
        assert!(matches!(
            api(404, None).into_platform(resource),
            PlatformError::NotFound { ref resource } if resource == "commits for acme/api"
        ));
        assert!(matches!(
            api(401, None).into_platform(resource),
            PlatformError::Unauthorized { .. }
        ));
        assert!(matches!(
            api(403, Some(quota(100))).into_platform(resource),
            PlatformError::Unauthorized { .. }
        ));
        assert!(matches!(
            api(503, None).into_platform(resource),
            PlatformError::UpstreamServer { status: 503, .. }
        ));
        assert!(matches!(
            api(422, None).into_platform(resource),
            PlatformError::Api { status: 422, .. }
        ));
        assert!(matches!(
            GitHubError::Http("reset".into()).into_platform(resource),
            PlatformError::Network { .. }
        ));
    }

    #[test]
    fn exhausted_quota_is_rate_limited_not_unauthorized() {
        let info = quota(0);
        let reset = info.reset_at;
        match api(403, Some(info)).into_platform("repos for acme") {
            PlatformError::RateLimited { reset_at } => assert_eq!(reset_at, reset),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(api(429, None).rate_limit_reset().is_some());
    }
}
