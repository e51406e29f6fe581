//! In-process fixed-window limiter.
//!
//! Only used while the shared store is unreachable. Counts reset at the end
//! of each window instead of sliding, which is cheaper but lets a caller
//! burst up to twice the limit across a window boundary. State is local to
//! this process, so a fleet of N processes admits up to N times the limit.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::backend::LimiterBackend;
use super::policy::Policy;
use super::result::RateLimitResult;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Default interval between sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackEntry {
    /// Checks seen in the current window, including denied ones
    pub count: u32,
    /// When the current window ends, in epoch milliseconds
    pub window_reset_at: i64,
}

/// Fixed-window counters held in process memory.
///
/// Checks and sweeps both mutate the map through its shard locks, so the
/// limiter can be shared freely between request handlers.
pub struct FallbackLimiter {
    entries: DashMap<String, FallbackEntry>,
    clock: Arc<dyn Clock>,
}

impl FallbackLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count one check against `key`. Never fails.
    pub fn check(&self, key: &str, policy: &Policy) -> RateLimitResult {
        let now = self.clock.now_millis();
        let window_millis = policy.window_millis();

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(FallbackEntry {
                count: 0,
                window_reset_at: now,
            });

        if now >= entry.window_reset_at {
            *entry = FallbackEntry {
                count: 1,
                window_reset_at: now.saturating_add(window_millis),
            };
            trace!(key = %key, "Fallback window started");
            return RateLimitResult::allowed(
                policy.limit,
                policy.limit.saturating_sub(1),
                policy.window_secs,
            );
        }

        entry.count = entry.count.saturating_add(1);
        let reset = reset_in_seconds(entry.window_reset_at.saturating_sub(now), policy.window_secs);

        if entry.count <= policy.limit {
            RateLimitResult::allowed(policy.limit, policy.limit - entry.count, reset)
        } else {
            debug!(
                key = %key,
                count = entry.count,
                limit = policy.limit,
                "Fallback rate limit exceeded"
            );
            RateLimitResult::denied(policy.limit, reset)
        }
    }

    /// Remove entries whose window has ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current runtime.
    ///
    /// The task holds only a weak reference and exits once the limiter is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed = removed, remaining = limiter.len(), "Swept fallback entries");
                }
            }
        })
    }

    /// Current entry for `key`, if any.
    pub fn entry(&self, key: &str) -> Option<FallbackEntry> {
        self.entries.get(key).map(|e| *e)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FallbackLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LimiterBackend for FallbackLimiter {
    async fn check(&self, key: &str, policy: &Policy) -> Result<RateLimitResult, StoreError> {
        Ok(FallbackLimiter::check(self, key, policy))
    }
}

/// Whole seconds until `remaining_millis` elapses, rounded up and capped at
/// the window length.
fn reset_in_seconds(remaining_millis: i64, window_secs: u64) -> u64 {
    let secs = (remaining_millis.max(0) as u64).div_ceil(1000);
    secs.min(window_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (FallbackLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (FallbackLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_fixed_window_scenario() {
        let (limiter, clock) = limiter();
        let policy = Policy::new("test", 3, 60);

        for expected in [2, 1, 0] {
            let result = limiter.check("u1", &policy);
            assert!(result.allowed);
            assert_eq!(result.remaining, expected);
            clock.advance(Duration::from_secs(1));
        }

        // t=3
        let denied = limiter.check("u1", &policy);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_in_seconds, 57);

        clock.set(61_000);
        let result = limiter.check("u1", &policy);
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[test]
    fn test_allowed_again_after_reset_elapses() {
        let (limiter, clock) = limiter();
        let policy = Policy::new("test", 2, 10);

        limiter.check("k", &policy);
        clock.advance(Duration::from_millis(2_500));
        limiter.check("k", &policy);
        let denied = limiter.check("k", &policy);
        assert!(!denied.allowed);
        // 7.5s left, rounded up
        assert_eq!(denied.reset_in_seconds, 8);

        clock.advance(Duration::from_secs(denied.reset_in_seconds));
        let result = limiter.check("k", &policy);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter();
        let policy = Policy::new("test", 1, 60);

        assert!(limiter.check("a", &policy).allowed);
        assert!(!limiter.check("a", &policy).allowed);
        assert!(limiter.check("b", &policy).allowed);
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let (limiter, clock) = limiter();
        let short = Policy::new("short", 5, 1);
        let long = Policy::new("long", 5, 60);

        limiter.check("a", &short);
        limiter.check("b", &long);
        assert_eq!(limiter.len(), 2);

        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.entry("a").is_none());
        assert_eq!(limiter.entry("b").map(|e| e.count), Some(1));
    }

    #[test]
    fn test_oversized_window_does_not_overflow() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = FallbackLimiter::with_clock(clock);
        let policy = Policy::new("test", 1, u64::MAX);

        assert!(limiter.check("k", &policy).allowed);
        assert_eq!(limiter.entry("k").map(|e| e.window_reset_at), Some(i64::MAX));
        assert!(!limiter.check("k", &policy).allowed);
        assert_eq!(limiter.sweep(), 0);
    }

    #[test]
    fn test_reset_in_seconds_bounds() {
        assert_eq!(reset_in_seconds(0, 60), 0);
        assert_eq!(reset_in_seconds(-5, 60), 0);
        assert_eq!(reset_in_seconds(1, 60), 1);
        assert_eq!(reset_in_seconds(120_000, 60), 60);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(FallbackLimiter::with_clock(clock.clone()));
        limiter.check("a", &Policy::new("test", 1, 1));

        clock.advance(Duration::from_secs(5));
        let handle = limiter.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(limiter.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_limiter_dropped() {
        let limiter = Arc::new(FallbackLimiter::new());
        let handle = limiter.spawn_sweeper(Duration::from_millis(10));
        drop(limiter);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_backend_trait_never_fails() {
        let (limiter, _clock) = limiter();
        let backend: &dyn LimiterBackend = &limiter;
        let policy = Policy::new("test", 1, 60);

        assert!(backend.check("k", &policy).await.unwrap().allowed);
        assert!(!backend.check("k", &policy).await.unwrap().allowed);
    }
}
