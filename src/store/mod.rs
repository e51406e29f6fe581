//! Shared window stores.
//!
//! A window store keeps, per key, an ordered set of timestamped events and
//! exposes exactly one operation: prune, count, insert and refresh expiry as
//! a single atomic unit. That batch is the only synchronization point
//! between limiter processes.

mod memory;
mod redis;

use async_trait::async_trait;

use crate::error::StoreError;

pub use self::memory::MemoryWindowStore;
pub use self::redis::RedisWindowStore;

/// One event to record in a key's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    /// Event time in epoch milliseconds, used as the ordering score
    pub at_millis: i64,
    /// Events scored at or before this instant are pruned first
    pub cutoff_millis: i64,
    /// Unique member id for this event
    pub member: String,
    /// Expiry applied to the whole key after the insert
    pub ttl_secs: u64,
}

/// An atomic sliding-window event store.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Prune expired events, count the survivors, insert `event` and refresh
    /// the key's expiry, all atomically.
    ///
    /// Returns the number of events present before the insert.
    async fn record(&self, key: &str, event: &WindowEvent) -> Result<u64, StoreError>;
}
