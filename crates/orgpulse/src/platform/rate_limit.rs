use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use super::errors::{PlatformError, Result};
use super::types::RateLimitInfo;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default rate-limit settings.
pub mod rate_limits {
    /// GitHub: 5000 requests/hour = ~1.4/sec, we use 10/sec to allow bursts.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
    /// Remaining-quota threshold at or below which the fetcher waits for reset.
    pub const LOW_QUOTA_THRESHOLD: usize = 1;
    /// Longest reset wait absorbed silently before surfacing `RateLimited`.
    pub const MAX_RESET_WAIT_SECS: u64 = 15 * 60;
}

/// A standalone API rate limiter using the governor crate.
///
/// Paces requests proactively; the header-driven reset waits live in
/// [`CredentialLimiter`].
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Rate-limit state for a single credential.
///
/// Shared by every in-flight request made with the same token, so a reset
/// observed by one request holds back its siblings until the same deadline
/// instead of each one sleeping on its own schedule.
pub struct CredentialLimiter {
    pacer: Option<ApiRateLimiter>,
    blocked_until: Mutex<Option<Instant>>,
    max_wait: Duration,
}

impl CredentialLimiter {
    fn new(requests_per_second: u32, max_wait: Duration) -> Self {
        Self {
            pacer: (requests_per_second > 0).then(|| ApiRateLimiter::new(requests_per_second)),
            blocked_until: Mutex::new(None),
            max_wait,
        }
    }

    /// Wait for any pending reset deadline, then for the pacer.
    pub async fn wait(&self) {
        loop {
            let deadline = *self
                .blocked_until
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match deadline {
                Some(deadline) if deadline > Instant::now() => {
                    tokio::time::sleep_until(deadline).await;
                }
                _ => break,
            }
        }

        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }
    }

    /// Record the quota reported by a response.
    ///
    /// Returns the wait that was scheduled when the remaining quota is at or
    /// below [`rate_limits::LOW_QUOTA_THRESHOLD`]. Resets further away than
    /// the maximum wait are not scheduled; the next request then fails with
    /// the upstream's rate-limit response instead of stalling.
    pub fn observe(&self, info: &RateLimitInfo) -> Option<Duration> {
        if info.remaining > rate_limits::LOW_QUOTA_THRESHOLD
            || wait_for(info.reset_at) > self.max_wait
        {
            return None;
        }
        Some(self.schedule(info.reset_at))
    }

    /// Block all requests for this credential until `reset_at`.
    ///
    /// Fails with `RateLimited` when the wait would exceed the configured
    /// maximum, leaving the caller to surface the error.
    pub fn block_until(&self, reset_at: DateTime<Utc>) -> Result<Duration> {
        let wait = wait_for(reset_at);
        if wait > self.max_wait {
            return Err(PlatformError::RateLimited { reset_at });
        }
        Ok(self.schedule(reset_at))
    }

    fn schedule(&self, reset_at: DateTime<Utc>) -> Duration {
        let wait = wait_for(reset_at);
        let deadline = Instant::now() + wait;
        let mut blocked = self
            .blocked_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match *blocked {
            Some(existing) if existing >= deadline => {}
            _ => *blocked = Some(deadline),
        }
        wait
    }

    /// Deadline currently holding requests back, if any.
    pub fn blocked_until(&self) -> Option<Instant> {
        let blocked = self
            .blocked_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        blocked.filter(|deadline| *deadline > Instant::now())
    }
}

fn wait_for(reset_at: DateTime<Utc>) -> Duration {
    (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Per-credential rate limiters.
///
/// Credentials are keyed by a hash so raw tokens are never held as map keys.
#[derive(Clone)]
pub struct RateLimitRegistry {
    limiters: Arc<Mutex<HashMap<u64, Arc<CredentialLimiter>>>>,
    requests_per_second: u32,
    max_wait: Duration,
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new(rate_limits::GITHUB_DEFAULT_RPS)
    }
}

impl RateLimitRegistry {
    /// Create a registry pacing each credential at `requests_per_second`
    /// (0 disables pacing; reset waits still apply).
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            limiters: Arc::new(Mutex::new(HashMap::new())),
            requests_per_second,
            max_wait: Duration::from_secs(rate_limits::MAX_RESET_WAIT_SECS),
        }
    }

    /// Override the longest reset wait absorbed silently.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Get (or create) the limiter shared by every request using `auth`.
    pub fn for_credential(&self, auth: Option<&str>) -> Arc<CredentialLimiter> {
        let key = credential_fingerprint(auth);
        let mut limiters = self.limiters.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(limiters.entry(key).or_insert_with(|| {
            Arc::new(CredentialLimiter::new(
                self.requests_per_second,
                self.max_wait,
            ))
        }))
    }
}

fn credential_fingerprint(auth: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    auth.hash(&mut hasher);
    hasher.finish()
}
