//! Limiter backend trait for abstracting persistent and in-process implementations.

use async_trait::async_trait;

use super::policy::Policy;
use super::result::RateLimitResult;
use crate::error::StoreError;

/// Trait for rate limiter backends.
///
/// Implemented by the Redis-backed [`SlidingWindowLimiter`] and the
/// in-process [`FallbackLimiter`] so the façade can treat them uniformly.
/// The two deliberately use different algorithms; only the result shape is
/// shared.
///
/// [`SlidingWindowLimiter`]: super::SlidingWindowLimiter
/// [`FallbackLimiter`]: super::FallbackLimiter
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Count one check against `key` under `policy`.
    async fn check(&self, key: &str, policy: &Policy) -> Result<RateLimitResult, StoreError>;
}
