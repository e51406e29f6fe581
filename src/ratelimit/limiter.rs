//! The rate limiter façade.
//!
//! Callers only ever see this type. It resolves the category's policy,
//! builds the storage key, and asks the persistent backend first. Any
//! failure of that backend (error, partial batch, timeout, or simply not
//! being configured) is absorbed here and the in-process fallback answers
//! instead. Store outages therefore degrade enforcement precision but never
//! surface to callers; only an unknown category does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::backend::LimiterBackend;
use super::fallback::{FallbackLimiter, DEFAULT_SWEEP_INTERVAL};
use super::key::{build_key, DEFAULT_KEY_PREFIX};
use super::policy::PolicyRegistry;
use super::result::RateLimitResult;
use super::sliding::SlidingWindowLimiter;
use crate::clock::{Clock, SystemClock};
use crate::config::GatekeeperConfig;
use crate::error::{GatekeeperError, Result, StoreError};
use crate::store::{RedisWindowStore, WindowStore};

/// Default bound on one persistent-store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Why a check was answered by the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    /// No persistent store is configured for this process
    NotConfigured,
    /// The store reported a connectivity or command error
    StoreUnavailable,
    /// The store did not answer in time
    Timeout,
    /// The store's batch did not complete as a whole
    PartialBatch,
}

impl From<&StoreError> for FallbackCause {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Timeout(_) => FallbackCause::Timeout,
            StoreError::PartialBatch(_) => FallbackCause::PartialBatch,
            StoreError::Redis(_) | StoreError::Unavailable(_) => FallbackCause::StoreUnavailable,
        }
    }
}

/// Which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPath {
    Persistent,
    Fallback(FallbackCause),
}

/// A result together with the path that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub result: RateLimitResult,
    pub path: CheckPath,
}

/// Count of checks answered by each path since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    pub persistent: u64,
    pub fallback: u64,
}

/// The rate limiter entry point.
///
/// Thread-safe; share it behind an `Arc` across request handlers.
///
/// When built inside a Tokio runtime the fallback's sweeper starts
/// immediately and is stopped when the limiter is dropped.
pub struct RateLimiter {
    registry: PolicyRegistry,
    primary: Option<Arc<dyn LimiterBackend>>,
    fallback: Arc<FallbackLimiter>,
    store_timeout: Duration,
    key_prefix: String,
    sweep_interval: Duration,
    sweeper: Option<JoinHandle<()>>,
    persistent_checks: AtomicU64,
    fallback_checks: AtomicU64,
}

impl RateLimiter {
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Build a limiter from loaded configuration.
    ///
    /// Without a configured store the limiter runs in-process only for the
    /// lifetime of the process.
    pub fn from_config(config: &GatekeeperConfig) -> Result<Self> {
        let registry = match &config.limiter.policies_path {
            Some(path) => PolicyRegistry::from_file(path)?,
            None => PolicyRegistry::builtin(),
        };

        let mut builder = Self::builder()
            .registry(registry)
            .store_timeout(config.limiter.store_timeout())
            .sweep_interval(config.limiter.sweep_interval())
            .key_prefix(config.limiter.key_prefix.clone());

        match &config.store {
            Some(store_config) => {
                let store = RedisWindowStore::new(store_config)
                    .map_err(|e| GatekeeperError::Config(e.to_string()))?;
                builder = builder.store(Arc::new(store));
            }
            None => {
                info!("No shared store configured, rate limiting is in-process only");
            }
        }

        Ok(builder.build())
    }

    /// Check one request for `identity` in `category`.
    ///
    /// Fails only for an unknown category.
    pub async fn check(&self, identity: &str, category: &str) -> Result<RateLimitResult> {
        Ok(self.check_detailed(identity, category).await?.result)
    }

    /// Like [`check`](Self::check), also reporting which path answered.
    pub async fn check_detailed(&self, identity: &str, category: &str) -> Result<CheckOutcome> {
        let policy = self.registry.lookup(category)?;
        let key = build_key(&self.key_prefix, category, identity);

        trace!(key = %key, category = %category, "Checking rate limit");

        let cause = match &self.primary {
            None => FallbackCause::NotConfigured,
            Some(primary) => {
                let attempt =
                    tokio::time::timeout(self.store_timeout, primary.check(&key, policy)).await;
                let err = match attempt {
                    Ok(Ok(result)) => {
                        self.persistent_checks.fetch_add(1, Ordering::Relaxed);
                        return Ok(CheckOutcome {
                            result,
                            path: CheckPath::Persistent,
                        });
                    }
                    Ok(Err(err)) => err,
                    Err(_) => StoreError::Timeout(self.store_timeout),
                };

                warn!(
                    key = %key,
                    category = %category,
                    error = %err,
                    "Persistent rate limit store failed, using in-process fallback"
                );
                FallbackCause::from(&err)
            }
        };

        let result = self.fallback.check(&key, policy);
        self.fallback_checks.fetch_add(1, Ordering::Relaxed);

        Ok(CheckOutcome {
            result,
            path: CheckPath::Fallback(cause),
        })
    }

    /// Start a sweep of the fallback's expired entries on the current
    /// runtime at the configured interval.
    ///
    /// Only needed for a limiter built outside a runtime; the caller owns
    /// the returned task.
    pub fn spawn_fallback_sweeper(&self) -> JoinHandle<()> {
        self.fallback.spawn_sweeper(self.sweep_interval)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Keys currently tracked by the in-process fallback.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn has_persistent_backend(&self) -> bool {
        self.primary.is_some()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            persistent: self.persistent_checks.load(Ordering::Relaxed),
            fallback: self.fallback_checks.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    registry: PolicyRegistry,
    store: Option<Arc<dyn WindowStore>>,
    backend: Option<Arc<dyn LimiterBackend>>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    sweep_interval: Duration,
    key_prefix: String,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            registry: PolicyRegistry::builtin(),
            store: None,
            backend: None,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl RateLimiterBuilder {
    pub fn registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a sliding-window limiter over `store` as the persistent backend.
    pub fn store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an arbitrary persistent backend. Takes precedence over `store`.
    pub fn backend(mut self, backend: Arc<dyn LimiterBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Clock shared by the sliding-window and fallback limiters.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// How often the fallback drops entries whose window has ended.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn build(self) -> RateLimiter {
        let clock = self.clock;
        let primary = self.backend.or_else(|| {
            self.store.map(|store| {
                Arc::new(SlidingWindowLimiter::with_clock(store, clock.clone()))
                    as Arc<dyn LimiterBackend>
            })
        });

        let fallback = Arc::new(FallbackLimiter::with_clock(clock));
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(fallback.spawn_sweeper(self.sweep_interval)),
            Err(_) => {
                debug!("No runtime at build time, fallback sweeper not started");
                None
            }
        };

        RateLimiter {
            registry: self.registry,
            primary,
            fallback,
            store_timeout: self.store_timeout,
            key_prefix: self.key_prefix,
            sweep_interval: self.sweep_interval,
            sweeper,
            persistent_checks: AtomicU64::new(0),
            fallback_checks: AtomicU64::new(0),
        }
    }
}
