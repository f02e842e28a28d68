//! Configuration types for catalog-export

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Worker pool configuration
///
/// Groups settings for the fixed pool of workers that resolve fetch tasks.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent workers (default: 3)
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
        }
    }
}

/// Token bucket rate limit configuration
///
/// The remote API allows 60 requests per minute; a full bucket of 60 tokens
/// refilled at 1 token per second matches that limit while permitting bursts
/// after idle periods.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size in tokens (default: 60)
    #[serde(default = "default_rate_capacity")]
    pub capacity: u64,

    /// Tokens added per second (default: 1.0)
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_rate: default_refill_rate(),
        }
    }
}

/// Retry behavior for failed remote fetches
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per task (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 5 seconds).
    /// Attempt n waits `base_delay * 2^n`: 5s, 10s, 20s with defaults.
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false, keeping the backoff
    /// schedule deterministic)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: false,
        }
    }
}

/// Main configuration for the export engine
///
/// Constructed once and immutable thereafter. All fields have sensible
/// defaults matching the remote API's published limits.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON string
    ///
    /// Missing fields fall back to their defaults. The loaded configuration
    /// is validated before being returned.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Config`] naming the offending key if any setting
    /// is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.pool.num_workers == 0 {
            return Err(Error::Config {
                message: "num_workers must be at least 1".to_string(),
                key: Some("pool.num_workers".to_string()),
            });
        }
        if self.rate_limit.capacity == 0 {
            return Err(Error::Config {
                message: "capacity must be at least 1".to_string(),
                key: Some("rate_limit.capacity".to_string()),
            });
        }
        if self.rate_limit.refill_rate.is_nan() || self.rate_limit.refill_rate <= 0.0 {
            return Err(Error::Config {
                message: "refill_rate must be positive".to_string(),
                key: Some("rate_limit.refill_rate".to_string()),
            });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(Error::Config {
                message: "base_delay must not exceed max_delay".to_string(),
                key: Some("retry.base_delay".to_string()),
            });
        }
        Ok(())
    }
}

fn default_num_workers() -> usize {
    3
}

fn default_rate_capacity() -> u64 {
    60
}

fn default_refill_rate() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_remote_api_limits() {
        let config = Config::default();

        assert_eq!(config.pool.num_workers, 3);
        assert_eq!(config.rate_limit.capacity, 60);
        assert_eq!(config.rate_limit.refill_rate, 1.0);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
        assert!(!config.retry.jitter, "jitter must default off");
    }

    #[test]
    fn default_config_validates() {
        Config::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = Config::default();
        config.pool.num_workers = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("pool.num_workers"));
            }
            other => panic!("expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn non_positive_refill_rate_rejected() {
        let mut config = Config::default();
        config.rate_limit.refill_rate = 0.0;
        assert!(config.validate().is_err());

        config.rate_limit.refill_rate = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_delay_above_max_delay_rejected() {
        let mut config = Config::default();
        config.retry.base_delay = Duration::from_secs(120);

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("retry.base_delay"));
            }
            other => panic!("expected Config error, got: {:?}", other),
        }
    }

    // --- Config JSON round-trip ---

    #[test]
    fn config_default_survives_json_round_trip() {
        let original = Config::default();

        let json = serde_json::to_string(&original).expect("Config must serialize to JSON");
        let restored: Config =
            serde_json::from_str(&json).expect("Config must deserialize from its own JSON");

        assert_eq!(
            restored.pool.num_workers, original.pool.num_workers,
            "num_workers must survive round-trip"
        );
        assert_eq!(
            restored.rate_limit.capacity, original.rate_limit.capacity,
            "capacity must survive round-trip"
        );
        assert_eq!(
            restored.retry.max_retries, original.retry.max_retries,
            "max_retries must survive round-trip"
        );
        assert_eq!(
            restored.retry.base_delay, original.retry.base_delay,
            "base_delay must survive round-trip"
        );
    }

    #[test]
    fn from_json_str_fills_missing_fields_with_defaults() {
        let config = Config::from_json_str(r#"{"pool":{"num_workers":5}}"#).unwrap();

        assert_eq!(config.pool.num_workers, 5);
        assert_eq!(
            config.rate_limit.capacity, 60,
            "unspecified sections must use defaults"
        );
    }

    #[test]
    fn from_json_str_rejects_invalid_settings() {
        let result = Config::from_json_str(r#"{"pool":{"num_workers":0}}"#);
        assert!(result.is_err(), "zero workers must fail validation");
    }

    // --- Duration serde helpers ---

    #[test]
    fn duration_serde_serializes_as_seconds() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            ..RetryConfig::default()
        };

        let json = serde_json::to_value(config).expect("serialize failed");

        assert_eq!(
            json["base_delay"], 5,
            "duration_serde must serialize Duration as integer seconds"
        );
        assert_eq!(json["max_delay"], 120);
    }

    #[test]
    fn duration_serde_deserializes_from_seconds() {
        let json = r#"{"max_retries":3,"base_delay":10,"max_delay":300,"jitter":false}"#;

        let config: RetryConfig = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(
            config.base_delay,
            Duration::from_secs(10),
            "integer 10 must deserialize to Duration::from_secs(10)"
        );
        assert_eq!(config.max_delay, Duration::from_secs(300));
    }
}
