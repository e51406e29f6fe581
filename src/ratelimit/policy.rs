//! Rate limit policies and the category registry.
//!
//! A policy bounds how many checks a single identity may pass within a
//! window. Policies are registered per category and are immutable once the
//! registry is built. The built-in table is what production traffic sees,
//! so its values must not drift.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};

/// Well-known category names.
pub mod categories {
    pub const STORY_GENERATION: &str = "story-generation";
    pub const IMAGE_GENERATION: &str = "image-generation";
    pub const PROFILE_IMAGE_GENERATION: &str = "profile-image-generation";
    pub const GENERAL: &str = "general";
    pub const AUTHENTICATION: &str = "authentication";
    pub const WAITLIST_SIGNUP: &str = "waitlist-signup";
    pub const SUPPORT_CONTACT: &str = "support-contact";
}

/// Longest accepted window: ten years.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

/// Limit and window for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Category this policy applies to
    pub category: String,
    /// Maximum checks allowed in one window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Policy {
    pub fn new(category: impl Into<String>, limit: u32, window_secs: u64) -> Self {
        Self {
            category: category.into(),
            limit,
            window_secs,
        }
    }

    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub(crate) fn window_millis(&self) -> i64 {
        i64::try_from(self.window_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// Expiry for a window's backing key: two windows.
    pub(crate) fn ttl_secs(&self) -> u64 {
        self.window_secs.saturating_mul(2)
    }

    fn validate(&self) -> Result<()> {
        if self.category.is_empty() {
            return Err(GatekeeperError::Config("policy category must not be empty".into()));
        }
        if self.category.contains(':') {
            return Err(GatekeeperError::Config(format!(
                "policy category '{}' must not contain ':'",
                self.category
            )));
        }
        if self.limit == 0 {
            return Err(GatekeeperError::Config(format!(
                "policy '{}' must have a limit greater than zero",
                self.category
            )));
        }
        if self.window_secs == 0 {
            return Err(GatekeeperError::Config(format!(
                "policy '{}' must have a window greater than zero",
                self.category
            )));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(GatekeeperError::Config(format!(
                "policy '{}' window of {}s exceeds the maximum of {}s",
                self.category, self.window_secs, MAX_WINDOW_SECS
            )));
        }
        Ok(())
    }
}

/// Limit and window keyed by category in the map form.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyLimits {
    limit: u32,
    window_secs: u64,
}

/// Document form: `policies: [...]`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    policies: Vec<Policy>,
}

/// Accepted shapes of a policy file, tried in order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolicyTable {
    /// `- {category, limit, window_secs}`
    List(Vec<Policy>),
    Document(PolicyDocument),
    /// `category: {limit, window_secs}`
    Map(BTreeMap<String, PolicyLimits>),
}

impl PolicyTable {
    fn into_policies(self) -> Vec<Policy> {
        match self {
            PolicyTable::List(policies) => policies,
            PolicyTable::Document(document) => document.policies,
            PolicyTable::Map(map) => map
                .into_iter()
                .map(|(category, limits)| Policy::new(category, limits.limit, limits.window_secs))
                .collect(),
        }
    }
}

/// Immutable lookup table from category name to policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Policy>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The production policy table.
    pub fn builtin() -> Self {
        use categories::*;

        Self::new()
            .with_policy(Policy::new(STORY_GENERATION, 10, 60))
            .with_policy(Policy::new(IMAGE_GENERATION, 5, 60))
            .with_policy(Policy::new(PROFILE_IMAGE_GENERATION, 3, 60))
            .with_policy(Policy::new(GENERAL, 100, 60))
            .with_policy(Policy::new(AUTHENTICATION, 10, 60))
            .with_policy(Policy::new(WAITLIST_SIGNUP, 3, 3600))
            .with_policy(Policy::new(SUPPORT_CONTACT, 5, 3600))
    }

    /// Add a policy, replacing any existing one for the same category.
    ///
    /// Intended for statically known values; loaded tables go through
    /// [`PolicyRegistry::from_policies`], which returns validation errors.
    /// An invalid policy here is a programming error.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        debug_assert!(
            policy.validate().is_ok(),
            "invalid policy for category '{}'",
            policy.category
        );
        self.policies.insert(policy.category.clone(), policy);
        self
    }

    /// Build a registry from a list, validating every entry.
    pub fn from_policies(policies: Vec<Policy>) -> Result<Self> {
        if policies.is_empty() {
            return Err(GatekeeperError::Config("policy table is empty".into()));
        }

        let mut registry = Self::new();
        for policy in policies {
            policy.validate()?;
            if registry.policies.contains_key(&policy.category) {
                return Err(GatekeeperError::Config(format!(
                    "duplicate policy for category '{}'",
                    policy.category
                )));
            }
            registry.policies.insert(policy.category.clone(), policy);
        }
        Ok(registry)
    }

    /// Load a policy table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a policy table from a YAML string.
    ///
    /// Accepts a bare list of policies, a document with a top-level
    /// `policies` list, or a map of category to `{limit, window_secs}`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: PolicyTable = serde_yaml::from_str(yaml).map_err(|e| {
            GatekeeperError::Config(format!("Failed to parse rate limit policies: {}", e))
        })?;
        Self::from_policies(table.into_policies())
    }

    /// Look up the policy for a category.
    pub fn lookup(&self, category: &str) -> Result<&Policy> {
        self.policies
            .get(category)
            .ok_or_else(|| GatekeeperError::UnknownCategory(category.to_string()))
    }

    /// Registered category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
