//! Sliding-window-log limiter over a shared window store.
//!
//! Every check records an event with its exact timestamp. Events older
//! than the window are pruned on each access, so enforcement is exact at
//! any instant rather than per aligned interval. Denied checks are recorded
//! too: a caller that keeps hammering a limited key stays limited.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::LimiterBackend;
use super::policy::Policy;
use super::result::RateLimitResult;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::store::{WindowEvent, WindowStore};

/// A rate limiter whose state lives in a [`WindowStore`] shared across
/// processes.
pub struct SlidingWindowLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter over `store` using the system clock.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check and record one request for `key`.
    ///
    /// Prune, count, insert and expiry refresh happen in one atomic store
    /// batch. Any store failure is returned as an error, never as a result.
    pub async fn check(&self, key: &str, policy: &Policy) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now_millis();
        let event = WindowEvent {
            at_millis: now,
            cutoff_millis: now.saturating_sub(policy.window_millis()),
            member: event_member(now),
            ttl_secs: policy.ttl_secs(),
        };

        let count = self.store.record(key, &event).await?;
        let limit = policy.limit as u64;

        trace!(
            key = %key,
            count = count,
            limit = limit,
            "Sliding window counted"
        );

        if count >= limit {
            debug!(
                key = %key,
                count = count,
                limit = limit,
                "Rate limit exceeded"
            );
            return Ok(RateLimitResult::denied(policy.limit, policy.window_secs));
        }

        let remaining = (limit - count - 1) as u32;
        Ok(RateLimitResult::allowed(policy.limit, remaining, policy.window_secs))
    }
}

#[async_trait]
impl LimiterBackend for SlidingWindowLimiter {
    async fn check(&self, key: &str, policy: &Policy) -> Result<RateLimitResult, StoreError> {
        SlidingWindowLimiter::check(self, key, policy).await
    }
}

/// Unique set member for an event: the timestamp alone would collide for
/// concurrent requests in the same millisecond.
fn event_member(now_millis: i64) -> String {
    format!("{}-{:016x}", now_millis, rand::random::<u64>())
}
