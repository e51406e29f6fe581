//! In-process window store.
//!
//! Gives the same atomicity guarantee as the Redis batch by running the
//! whole batch under one lock. Useful for tests and for local development
//! without a Redis server; it is not shared between processes.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{WindowEvent, WindowStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct SortedEvents {
    /// member -> score
    members: HashMap<String, i64>,
    /// Absolute expiry in epoch milliseconds
    expires_at: i64,
}

/// Window store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    keys: Mutex<HashMap<String, SortedEvents>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events currently recorded for `key`, ignoring expiry.
    pub fn event_count(&self, key: &str) -> usize {
        self.keys
            .lock()
            .get(key)
            .map(|events| events.members.len())
            .unwrap_or(0)
    }

    /// Number of keys currently held.
    pub fn key_count(&self) -> usize {
        self.keys.lock().len()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn record(&self, key: &str, event: &WindowEvent) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock();
        keys.retain(|_, events| events.expires_at > event.at_millis);

        let events = keys.entry(key.to_string()).or_default();
        events
            .members
            .retain(|_, score| *score > event.cutoff_millis);

        let count = events.members.len() as u64;
        events.members.insert(event.member.clone(), event.at_millis);
        events.expires_at = i64::try_from(event.ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
            .saturating_add(event.at_millis);

        Ok(count)
    }
}
