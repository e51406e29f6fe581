//! Response header values derived from a check result.

use super::result::RateLimitResult;

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";

/// Header values for the protocol layer to attach to its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: String,
    pub remaining: String,
    pub reset: String,
}

impl RateLimitHeaders {
    /// `(name, value)` pairs in limit, remaining, reset order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (LIMIT_HEADER, self.limit.as_str()),
            (REMAINING_HEADER, self.remaining.as_str()),
            (RESET_HEADER, self.reset.as_str()),
        ]
        .into_iter()
    }
}

impl From<&RateLimitResult> for RateLimitHeaders {
    fn from(result: &RateLimitResult) -> Self {
        Self {
            limit: result.limit.to_string(),
            remaining: result.remaining.to_string(),
            reset: result.reset_in_seconds.to_string(),
        }
    }
}

impl RateLimitResult {
    pub fn headers(&self) -> RateLimitHeaders {
        RateLimitHeaders::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_from_allowed_result() {
        let headers = RateLimitResult::allowed(10, 7, 60).headers();
        assert_eq!(headers.limit, "10");
        assert_eq!(headers.remaining, "7");
        assert_eq!(headers.reset, "60");
    }

    #[test]
    fn test_header_names_and_order() {
        let headers = RateLimitResult::denied(3, 57).headers();
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("X-RateLimit-Limit", "3"),
                ("X-RateLimit-Remaining", "0"),
                ("X-RateLimit-Reset", "57"),
            ]
        );
    }
}
