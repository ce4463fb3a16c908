//! Client-side throttling of source API calls
//!
//! A token bucket from `governor`. Both SaaS APIs publish per-second quotas,
//! and staying under them keeps 429s rare.

use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Sustained rate and burst of the token bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    /// Bucket capacity
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(10, 10)
    }
}

impl RateLimiterConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Zero is raised to one so a misconfigured limit still makes progress
    fn quota(&self) -> Quota {
        let rate = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// Shared token bucket; clones draw from the same bucket
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            bucket: Arc::new(DefaultDirectRateLimiter::direct(config.quota())),
        }
    }

    /// Suspend until a token is available
    pub async fn wait(&self) {
        self.bucket.until_ready().await;
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
