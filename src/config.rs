//! Engine configuration
//!
//! Loaded from defaults, environment variables (`CROSSVAL_*`) or a YAML
//! document. Every threshold is a ratio in [0, 1]; anything outside that
//! range is rejected by [`EngineConfig::validate`] before an engine exists.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Weights awarded to each matching field of a source pair.
///
/// The same weights apply to every pair of sources.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub email: f64,
    pub phone: f64,
    pub name: f64,
    pub id_exact: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            email: 30.0,
            phone: 35.0,
            name: 25.0,
            id_exact: 10.0,
        }
    }
}

impl FieldWeights {
    pub fn total(&self) -> f64 {
        self.email + self.phone + self.name + self.id_exact
    }
}

/// Configuration for the cross-validation engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum consistency ratio for a multi-source pass
    pub fuzzy_threshold: f64,
    pub phone_match_threshold: f64,
    pub email_match_threshold: f64,
    pub name_match_threshold: f64,
    /// Multiplier applied to `fuzzy_threshold` when exactly two sources are available
    pub partial_coverage_factor: f64,
    pub cache_ttl_secs: u64,
    pub rate_limit_window_secs: u64,
    /// Attempts allowed per identity inside one window
    pub rate_limit_max: usize,
    pub sweep_interval_secs: u64,
    pub weights: FieldWeights,
    /// Case-insensitive substrings that mark an identity as suspicious
    pub suspicious_tokens: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.80,
            phone_match_threshold: 0.90,
            email_match_threshold: 0.85,
            name_match_threshold: 0.75,
            partial_coverage_factor: 0.80,
            cache_ttl_secs: 24 * 60 * 60, // 24 hours
            rate_limit_window_secs: 60 * 60, // 1 hour
            rate_limit_max: 5,
            sweep_interval_secs: 5 * 60,
            weights: FieldWeights::default(),
            suspicious_tokens: ["test", "demo", "fake", "temp", "00000"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fuzzy_threshold: env_or("CROSSVAL_FUZZY_THRESHOLD", defaults.fuzzy_threshold),
            phone_match_threshold: env_or(
                "CROSSVAL_PHONE_MATCH_THRESHOLD",
                defaults.phone_match_threshold,
            ),
            email_match_threshold: env_or(
                "CROSSVAL_EMAIL_MATCH_THRESHOLD",
                defaults.email_match_threshold,
            ),
            name_match_threshold: env_or(
                "CROSSVAL_NAME_MATCH_THRESHOLD",
                defaults.name_match_threshold,
            ),
            partial_coverage_factor: env_or(
                "CROSSVAL_PARTIAL_COVERAGE_FACTOR",
                defaults.partial_coverage_factor,
            ),
            cache_ttl_secs: env_or("CROSSVAL_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            rate_limit_window_secs: env_or(
                "CROSSVAL_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            rate_limit_max: env_or("CROSSVAL_RATE_LIMIT_MAX", defaults.rate_limit_max),
            sweep_interval_secs: env_or(
                "CROSSVAL_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            weights: defaults.weights,
            suspicious_tokens: std::env::var("CROSSVAL_SUSPICIOUS_TOKENS")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.suspicious_tokens),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string; omitted fields keep their defaults
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Reject out-of-range values. Called by the engine constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("phone_match_threshold", self.phone_match_threshold),
            ("email_match_threshold", self.email_match_threshold),
            ("name_match_threshold", self.name_match_threshold),
            ("partial_coverage_factor", self.partial_coverage_factor),
        ] {
            // NaN fails the range check too
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { field, value });
            }
        }

        for (field, value) in [
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("rate_limit_window_secs", self.rate_limit_window_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.rate_limit_max == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_max",
                reason: "must be greater than zero".to_string(),
            });
        }

        let w = &self.weights;
        if [w.email, w.phone, w.name, w.id_exact]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::InvalidValue {
                field: "weights",
                reason: "weights must be finite and non-negative".to_string(),
            });
        }
        let total = w.total();
        if total <= 0.0 || total > 100.0 {
            return Err(ConfigError::InvalidValue {
                field: "weights",
                reason: format!("weights must sum to (0, 100], got {}", total),
            });
        }

        if self.suspicious_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "suspicious_tokens",
                reason: "tokens must not be blank".to_string(),
            });
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
