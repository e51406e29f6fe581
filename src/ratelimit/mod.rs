//! Rate limiting logic: policies, backends and the caller-facing façade.

mod backend;
mod fallback;
mod headers;
mod key;
mod limiter;
mod policy;
mod result;
mod sliding;

pub use backend::LimiterBackend;
pub use fallback::{FallbackEntry, FallbackLimiter, DEFAULT_SWEEP_INTERVAL};
pub use headers::{RateLimitHeaders, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
pub use key::{build_key, DEFAULT_KEY_PREFIX};
pub use limiter::{
    CheckOutcome, CheckPath, FallbackCause, LimiterStats, RateLimiter, RateLimiterBuilder,
    DEFAULT_STORE_TIMEOUT,
};
pub use policy::{categories, Policy, PolicyRegistry, MAX_WINDOW_SECS};
pub use result::RateLimitResult;
pub use sliding::SlidingWindowLimiter;
