//! Error types for the Gatekeeper crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that escape the limiter façade.
///
/// Store availability problems are never represented here; they are
/// absorbed by the fallback path. What remains are programmer and
/// configuration mistakes.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// A check named a category that has no registered policy.
    #[error("Unknown rate limit category: {0}")]
    UnknownCategory(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(err: config::ConfigError) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// Failures of the shared window store.
///
/// Every variant means "no trustworthy count was obtained" and is handled
/// identically by the façade.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity or command failure reported by Redis.
    #[error("Store unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store did not answer within the configured bound.
    #[error("Store timed out after {0:?}")]
    Timeout(Duration),

    /// The batch did not complete as a whole.
    #[error("Partial batch: {0}")]
    PartialBatch(String),

    /// Generic unavailability, used by non-Redis stores.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
