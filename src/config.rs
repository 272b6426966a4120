//! Type-Safe Limiter Configuration with Validation
//!
//! Provides limiter configuration with environment variable support and
//! fatal validation at construction time.

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors. All fatal: an invalid configuration prevents the
/// limiter from being constructed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Window size of zero seconds
    #[error("Invalid window: must be greater than 0 seconds")]
    InvalidWindow,

    /// Quota ceiling of zero
    #[error("Invalid limit for {field}: must be greater than 0")]
    InvalidLimit {
        /// Which limit field was rejected
        field: String,
    },

    /// Ceilings that contradict each other (e.g. hourly below per-minute)
    #[error("Inconsistent ceilings: {reason}")]
    InconsistentCeilings {
        /// Description of the contradiction
        reason: String,
    },

    /// Score threshold outside [0, 1]
    #[error("Invalid threshold for {field}: must be within [0, 1]")]
    InvalidThreshold {
        /// Which threshold field was rejected
        field: String,
    },

    /// IP present in both whitelist and blacklist
    #[error("IP {ip} appears in both whitelist and blacklist")]
    ListOverlap {
        /// The conflicting IP
        ip: String,
    },

    /// Unknown strategy name
    #[error("Unknown rate limit strategy: {name}")]
    UnknownStrategy {
        /// The rejected strategy name
        name: String,
    },

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parse failure description
        reason: String,
    },
}

/// Quota counting strategy, selectable per limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Count requests inside the current epoch-aligned window
    FixedWindow,
    /// Count requests inside `[now - window, now]`, recomputed per check
    SlidingWindow,
    /// Consume one token per allowed request from a pool of `burst_limit`.
    /// Tokens are never replenished while the key's state is live; the pool
    /// resets only when the state expires. There is no timer-based refill.
    TokenBucket,
    /// Sliding window with the limit itself adjusted by threat level
    Adaptive,
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed_window" => Ok(Self::FixedWindow),
            "sliding_window" => Ok(Self::SlidingWindow),
            "token_bucket" => Ok(Self::TokenBucket),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(ConfigError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Limiter configuration with validation.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Base quota ceiling for the primary counting window
    pub requests_per_minute: u32,
    /// Secondary hourly ceiling
    pub requests_per_hour: u32,
    /// Secondary daily ceiling
    pub requests_per_day: u32,
    /// Token-bucket capacity
    pub burst_limit: u32,
    /// Seconds per primary counting window
    pub window_size_secs: u64,
    /// Seconds an IP stays blocked after a critical verdict
    pub cooldown_period_secs: u64,
    /// Enables threat-based limit tightening
    pub adaptive_enabled: bool,
    /// Score above which a check counts as an anomaly
    pub anomaly_threshold: f64,
    /// Static bypass list, exact IP match
    pub whitelist_ips: HashSet<String>,
    /// Static deny list, exact IP match
    pub blacklist_ips: HashSet<String>,
    /// Score above which a non-critical denial emits an alert
    pub alert_threshold: f64,
    /// Seconds between alerts for the same client
    pub alert_cooldown_secs: u64,
    /// Quota counting strategy
    pub strategy: Strategy,
    /// Deadline for a single quota backend call, in milliseconds
    pub backend_timeout_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            requests_per_hour: 1_000,
            requests_per_day: 10_000,
            burst_limit: 50,
            window_size_secs: 60,
            cooldown_period_secs: 300,
            adaptive_enabled: true,
            anomaly_threshold: 0.5,
            whitelist_ips: HashSet::new(),
            blacklist_ips: HashSet::new(),
            alert_threshold: 0.5,
            alert_cooldown_secs: 300,
            strategy: Strategy::Adaptive,
            backend_timeout_ms: 50,
        }
    }
}

impl LimiterConfig {
    /// Loads configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let strategy = match env::var("RATE_GUARD_STRATEGY") {
            Ok(name) => name.parse()?,
            Err(_) => defaults.strategy,
        };

        let config = Self {
            requests_per_minute: parse_env("RATE_GUARD_REQUESTS_PER_MINUTE", defaults.requests_per_minute)?,
            requests_per_hour: parse_env("RATE_GUARD_REQUESTS_PER_HOUR", defaults.requests_per_hour)?,
            requests_per_day: parse_env("RATE_GUARD_REQUESTS_PER_DAY", defaults.requests_per_day)?,
            burst_limit: parse_env("RATE_GUARD_BURST_LIMIT", defaults.burst_limit)?,
            window_size_secs: parse_env("RATE_GUARD_WINDOW_SIZE", defaults.window_size_secs)?,
            cooldown_period_secs: parse_env("RATE_GUARD_COOLDOWN_PERIOD", defaults.cooldown_period_secs)?,
            adaptive_enabled: parse_env("RATE_GUARD_ADAPTIVE_ENABLED", defaults.adaptive_enabled)?,
            anomaly_threshold: parse_env("RATE_GUARD_ANOMALY_THRESHOLD", defaults.anomaly_threshold)?,
            whitelist_ips: parse_list_env("RATE_GUARD_WHITELIST_IPS"),
            blacklist_ips: parse_list_env("RATE_GUARD_BLACKLIST_IPS"),
            alert_threshold: parse_env("RATE_GUARD_ALERT_THRESHOLD", defaults.alert_threshold)?,
            alert_cooldown_secs: parse_env("RATE_GUARD_ALERT_COOLDOWN", defaults.alert_cooldown_secs)?,
            strategy,
            backend_timeout_ms: parse_env("RATE_GUARD_BACKEND_TIMEOUT_MS", defaults.backend_timeout_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size_secs == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        for (field, value) in [
            ("requests_per_minute", self.requests_per_minute),
            ("requests_per_hour", self.requests_per_hour),
            ("requests_per_day", self.requests_per_day),
            ("burst_limit", self.burst_limit),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidLimit {
                    field: field.to_string(),
                });
            }
        }
        if self.requests_per_hour < self.requests_per_minute {
            return Err(ConfigError::InconsistentCeilings {
                reason: "requests_per_hour below requests_per_minute".to_string(),
            });
        }
        if self.requests_per_day < self.requests_per_hour {
            return Err(ConfigError::InconsistentCeilings {
                reason: "requests_per_day below requests_per_hour".to_string(),
            });
        }
        for (field, value) in [
            ("anomaly_threshold", self.anomaly_threshold),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold {
                    field: field.to_string(),
                });
            }
        }
        if self.cooldown_period_secs == 0 {
            return Err(ConfigError::ParseError {
                name: "RATE_GUARD_COOLDOWN_PERIOD".to_string(),
                reason: "cooldown must be greater than 0".to_string(),
            });
        }
        if self.backend_timeout_ms == 0 {
            return Err(ConfigError::ParseError {
                name: "RATE_GUARD_BACKEND_TIMEOUT_MS".to_string(),
                reason: "timeout must be greater than 0".to_string(),
            });
        }
        if let Some(ip) = self.whitelist_ips.intersection(&self.blacklist_ips).next() {
            return Err(ConfigError::ListOverlap { ip: ip.clone() });
        }
        Ok(())
    }

    /// Primary window length as a float, for timestamp arithmetic.
    #[must_use]
    pub fn window_secs_f64(&self) -> f64 {
        self.window_size_secs as f64
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list environment variable.
fn parse_list_env(name: &str) -> HashSet<String> {
    env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
