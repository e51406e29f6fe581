//! Gatekeeper - Distributed Request Rate Limiting
//!
//! This crate bounds how often an identity may invoke an expensive or
//! abuse-sensitive operation across a fleet of stateless processes. Counts
//! live in a shared Redis store as sliding-window logs updated by atomic
//! batches. When the store is unreachable, checks fail open onto a
//! per-process fixed-window counter instead of surfacing an error.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{GatekeeperError, Result, StoreError};
pub use ratelimit::{RateLimitResult, RateLimiter};
