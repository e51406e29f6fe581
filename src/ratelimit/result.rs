//! The outcome of a single rate limit check.

use serde::{Deserialize, Serialize};

/// Decision returned to callers.
///
/// A denial is a normal value, not an error. The HTTP layer decides
/// whether it becomes a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    /// Whether the gated operation may proceed
    pub allowed: bool,
    /// Checks left in the current window, zero when denied
    pub remaining: u32,
    /// Seconds until the caller should expect capacity again
    pub reset_in_seconds: u64,
    /// The policy limit that was applied
    pub limit: u32,
}

impl RateLimitResult {
    /// An allowed result. `remaining` is clamped to `limit - 1`.
    pub fn allowed(limit: u32, remaining: u32, reset_in_seconds: u64) -> Self {
        Self {
            allowed: true,
            remaining: remaining.min(limit.saturating_sub(1)),
            reset_in_seconds,
            limit,
        }
    }

    /// A denied result.
    pub fn denied(limit: u32, reset_in_seconds: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in_seconds,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_has_no_remaining() {
        let result = RateLimitResult::denied(10, 60);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[test]
    fn test_allowed_remaining_clamped() {
        let result = RateLimitResult::allowed(3, 3, 60);
        assert_eq!(result.remaining, 2);
    }

    #[test]
    fn test_serializes_field_names() {
        let json = serde_json::to_value(RateLimitResult::allowed(5, 4, 60)).unwrap();
        assert_eq!(json["allowed"], true);
        assert_eq!(json["remaining"], 4);
        assert_eq!(json["reset_in_seconds"], 60);
        assert_eq!(json["limit"], 5);
    }
}
