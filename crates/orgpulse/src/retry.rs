//! Retry policy for transient upstream failures.
//!
//! The policy wraps a single upstream call: transient failures (5xx and
//! network errors) are retried with exponential backoff up to a fixed budget,
//! everything else is returned immediately. Rate-limit errors are not handled
//! here; the fetcher sleeps until the reported reset instead.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::platform::{PlatformError, short_error_message};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default delay before the first retry; doubles on each subsequent attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Predicate deciding whether an error is worth another attempt.
pub type RetryPredicate = fn(&PlatformError) -> bool;

/// Retry configuration for upstream calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
    /// Which errors are retried.
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            with_jitter: false,
            retryable: PlatformError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom limits.
    #[must_use]
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Replace the retryable-error predicate.
    #[must_use]
    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Whether `err` would be retried under this policy.
    pub fn is_retryable(&self, err: &PlatformError) -> bool {
        (self.retryable)(err)
    }

    /// Backoff delay before retry number `retry` (0-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Build an exponential backoff strategy from this policy.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }

    /// Run `operation`, retrying retryable failures per this policy.
    ///
    /// `resource` is the context string used in log lines.
    pub async fn run<T, F, Fut>(&self, resource: &str, operation: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let attempt = AtomicU32::new(0);
        let mut operation = operation;
        let retryable = self.retryable;

        let op = || {
            attempt.fetch_add(1, Ordering::SeqCst);
            operation()
        };

        op.retry(self.backoff())
            .when(|e| retryable(e))
            .notify(|err, dur| {
                tracing::warn!(
                    resource,
                    attempt = attempt.load(Ordering::SeqCst),
                    retry_in_ms = dur.as_millis() as u64,
                    error = %short_error_message(err),
                    "Transient upstream failure, retrying"
                );
            })
            .await
    }
}
