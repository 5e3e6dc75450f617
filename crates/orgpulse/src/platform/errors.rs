use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when talking to the upstream API.
///
/// Every variant that refers to an upstream resource carries the resource
/// context string (e.g. `"commits for org/repo"`) so failures can be diagnosed
/// from the log line alone.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Resource not found (org, repo, branch). Never retried.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Credential missing, invalid, or lacking access. Never retried.
    #[error("Unauthorized: {resource}")]
    Unauthorized { resource: String },

    /// Rate limit exceeded and the reset is too far away to wait for.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Upstream returned a 5xx response.
    #[error("Upstream server error ({status}) fetching {resource}")]
    UpstreamServer { status: u16, resource: String },

    /// Any other non-success response.
    #[error("API error ({status}) fetching {resource}: {message}")]
    Api {
        status: u16,
        resource: String,
        message: String,
    },

    /// Network or connection error.
    #[error("Network error fetching {resource}: {message}")]
    Network { resource: String, message: String },

    /// Response body could not be decoded.
    #[error("Could not decode {resource}: {message}")]
    Decode { resource: String, message: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an unauthorized error.
    #[inline]
    pub fn unauthorized(resource: impl Into<String>) -> Self {
        Self::Unauthorized {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is worth retrying with backoff (5xx or network).
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamServer { .. } | Self::Network { .. })
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps progress and log
/// output to one line even when the upstream body is multi-line.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
