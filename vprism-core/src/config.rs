//! Layered configuration (§6): defaults, overridable by a config file and
//! environment variables, loaded via the `config` crate the way the
//! teacher's gateway loads its own settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub memory_size: usize,
    pub disk_path: Option<String>,
    pub ttl_tick_seconds: u64,
    pub ttl_minute_seconds: u64,
    pub ttl_daily_seconds: u64,
    pub ttl_weekly_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_size: 10_000,
            disk_path: None,
            ttl_tick_seconds: 5,
            ttl_minute_seconds: 60,
            ttl_daily_seconds: 3600,
            ttl_weekly_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(with = "duration_seconds")]
    pub timeout: Duration,
    pub max_retries: u32,
    pub rate_limit: Option<u32>,
    pub backoff_factor: f64,
    #[serde(with = "duration_seconds")]
    pub max_backoff: Duration,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            rate_limit: None,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    #[serde(with = "duration_seconds")]
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            timeout_seconds: 5,
            failure_threshold: 3,
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub default_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 10,
        }
    }
}

/// Top-level configuration, assembled by `config::Config` from defaults
/// layered under an optional file and `VPRISM_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl CoreConfig {
    /// Load defaults, then an optional config file at `path`, then
    /// environment variables prefixed `VPRISM` (double underscore as the
    /// nesting separator, e.g. `VPRISM__CACHE__MEMORY_SIZE`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&CoreConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("VPRISM")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

/// `serde(with = ...)` helper serializing a `Duration` as whole seconds.
pub mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
