//! Storage key generation.

/// Default namespace for limiter keys in the shared store.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";

/// Build the storage key for an identity within a category.
///
/// The key is `prefix:category:identity`. Categories never contain `:`
/// (the registry rejects them), so the category segment is always
/// recoverable and two categories can never produce the same key, even
/// when identities themselves contain colons (IPv6 addresses).
pub fn build_key(prefix: &str, category: &str, identity: &str) -> String {
    format!("{}:{}:{}", prefix, category, identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key_format() {
        assert_eq!(
            build_key(DEFAULT_KEY_PREFIX, "authentication", "user-42"),
            "ratelimit:authentication:user-42"
        );
    }

    #[test]
    fn test_keys_differ_by_category() {
        let a = build_key(DEFAULT_KEY_PREFIX, "authentication", "10.0.0.1");
        let b = build_key(DEFAULT_KEY_PREFIX, "general", "10.0.0.1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_keys_differ_by_identity() {
        let a = build_key(DEFAULT_KEY_PREFIX, "authentication", "u1");
        let b = build_key(DEFAULT_KEY_PREFIX, "authentication", "u2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_ipv6_identity_is_kept_verbatim() {
        let key = build_key("rl", "general", "2001:db8::1");
        assert_eq!(key, "rl:general:2001:db8::1");
        assert_eq!(key.splitn(3, ':').nth(1), Some("general"));
    }
}
