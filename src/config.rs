//! Configuration management for Gatekeeper.
//!
//! Configuration is read once at process start. Sources, lowest priority
//! first: an optional YAML file, then `GATEKEEPER_*` environment variables
//! (nested with `__`). Store connection details may also come from the
//! conventional `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD` and `REDIS_DB`
//! variables. Without a store host the process runs in-process only.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{DEFAULT_KEY_PREFIX, DEFAULT_STORE_TIMEOUT, DEFAULT_SWEEP_INTERVAL};

/// Main configuration for Gatekeeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Shared store connection; `None` disables the persistent backend
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// Limiter tuning
    #[serde(default)]
    pub limiter: LimiterSettings,
}

/// Connection settings for the shared Redis store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: i64,
}

fn default_port() -> u16 {
    6379
}

impl StoreConfig {
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    /// Read `REDIS_*` variables. Returns `None` when no host is set.
    pub fn from_env() -> Result<Option<Self>> {
        let raw: RawStoreEnv = config::Config::builder()
            .add_source(config::Environment::with_prefix("REDIS").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(raw.into_config())
    }
}

/// `REDIS_*` variables as found; everything optional.
#[derive(Debug, Default, Deserialize)]
struct RawStoreEnv {
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    db: Option<i64>,
}

impl RawStoreEnv {
    fn into_config(self) -> Option<StoreConfig> {
        let host = self.host.filter(|h| !h.trim().is_empty())?;
        Some(StoreConfig {
            host,
            port: self.port.unwrap_or_else(default_port),
            password: self.password.filter(|p| !p.is_empty()),
            db: self.db.unwrap_or(0),
        })
    }
}

/// Limiter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Upper bound on one persistent-store round trip, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// How often the fallback sweeps expired entries, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Namespace prepended to every storage key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Optional YAML policy table replacing the built-in one
    #[serde(default)]
    pub policies_path: Option<String>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            key_prefix: default_key_prefix(),
            policies_path: None,
        }
    }
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT.as_millis() as u64
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl LimiterSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl GatekeeperConfig {
    /// Load configuration from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GATEKEEPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: GatekeeperConfig = builder.build()?.try_deserialize()?;
        if config.store.is_none() {
            config.store = StoreConfig::from_env()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without consulting the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig =
            serde_yaml::from_str(yaml).map_err(|e| GatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limiter.store_timeout_ms == 0 {
            return Err(GatekeeperError::Config(
                "limiter.store_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.limiter.sweep_interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "limiter.sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if self.limiter.key_prefix.is_empty() {
            return Err(GatekeeperError::Config("limiter.key_prefix must not be empty".into()));
        }
        if let Some(store) = &self.store {
            if store.host.trim().is_empty() {
                return Err(GatekeeperError::Config("store.host must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::default();
        assert!(config.store.is_none());
        assert_eq!(config.limiter.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.limiter.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.limiter.key_prefix, "ratelimit");
    }

    #[test]
    fn test_from_yaml_with_store() {
        let yaml = r#"
store:
  host: redis.internal
  password: hunter2
  db: 3
limiter:
  store_timeout_ms: 100
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        let store = config.store.unwrap();
        assert_eq!(store.host, "redis.internal");
        assert_eq!(store.port, 6379);
        assert_eq!(store.db, 3);
        assert_eq!(config.limiter.store_timeout_ms, 100);
        assert_eq!(config.limiter.sweep_interval_secs, 300);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = "limiter:\n  store_timeout_ms: 0\n";
        assert!(matches!(
            GatekeeperConfig::from_yaml(yaml),
            Err(GatekeeperError::Config(_))
        ));
    }

    #[test]
    fn test_connection_info() {
        let store = StoreConfig {
            host: "cache".to_string(),
            port: 6380,
            password: Some("secret".to_string()),
            db: 2,
        };
        let info = store.connection_info();
        assert!(matches!(info.addr, redis::ConnectionAddr::Tcp(ref host, 6380) if host == "cache"));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_raw_env_without_host_is_in_process_only() {
        let raw = RawStoreEnv {
            port: Some(6380),
            ..Default::default()
        };
        assert!(raw.into_config().is_none());

        let blank = RawStoreEnv {
            host: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank.into_config().is_none());
    }

    #[test]
    fn test_raw_env_defaults() {
        let raw = RawStoreEnv {
            host: Some("localhost".to_string()),
            password: Some(String::new()),
            ..Default::default()
        };
        let store = raw.into_config().unwrap();
        assert_eq!(store.port, 6379);
        assert_eq!(store.db, 0);
        assert!(store.password.is_none());
    }

    #[test]
    fn test_load_reads_environment() {
        std::env::set_var("REDIS_HOST", "cache.internal");
        std::env::set_var("REDIS_PORT", "6390");
        std::env::set_var("REDIS_DB", "4");
        std::env::set_var("REDIS_PASSWORD", "s3cret");
        std::env::set_var("GATEKEEPER_LIMITER__STORE_TIMEOUT_MS", "75");

        let store = StoreConfig::from_env();
        let loaded = GatekeeperConfig::load(None);

        for var in [
            "REDIS_HOST",
            "REDIS_PORT",
            "REDIS_DB",
            "REDIS_PASSWORD",
            "GATEKEEPER_LIMITER__STORE_TIMEOUT_MS",
        ] {
            std::env::remove_var(var);
        }

        let store = store.unwrap().unwrap();
        assert_eq!(store.host, "cache.internal");
        assert_eq!(store.port, 6390);
        assert_eq!(store.db, 4);
        assert_eq!(store.password.as_deref(), Some("s3cret"));

        let config = loaded.unwrap();
        assert_eq!(config.limiter.store_timeout(), Duration::from_millis(75));
        assert_eq!(config.limiter.sweep_interval_secs, 300);
        assert_eq!(config.store.map(|s| s.port), Some(6390));
    }
}
