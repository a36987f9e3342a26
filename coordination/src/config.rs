//! Coordinator configuration.
//!
//! Built-in defaults, optionally overlaid by a TOML document and then by
//! `COORD_*` environment variables.
//!
//! ```toml
//! history_capacity = 50
//!
//! [dispatch]
//! group_timeout_ms = 20000
//! worker_timeout_ms = 8000
//! max_retries = 2
//! retry_base_delay_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Timeouts and retry policy for the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for the whole team
    pub group_timeout_ms: u64,
    /// Deadline for a single worker attempt
    pub worker_timeout_ms: u64,
    /// Attempts after the first one
    pub max_retries: u32,
    /// Linear backoff unit: attempt `n` waits `n * base` before retrying
    pub retry_base_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            group_timeout_ms: 45_000,
            worker_timeout_ms: 30_000,
            max_retries: 2,
            retry_base_delay_ms: 1_000,
        }
    }
}

impl DispatchConfig {
    pub fn group_timeout(&self) -> Duration {
        Duration::from_millis(self.group_timeout_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Thresholds for rejecting worker responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_text_len: usize,
    pub min_confidence: f64,
    /// Reject once this many distinct failure words appear
    pub max_failure_indicators: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_text_len: 10,
            min_confidence: 0.10,
            max_failure_indicators: 2,
        }
    }
}

/// Pre-dispatch health check thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// History needed before the success rate is enforced
    pub min_queries_for_rate: u64,
    pub min_success_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_queries_for_rate: 5,
            min_success_rate: 0.30,
        }
    }
}

/// Candidate scoring policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Candidates scoring below this are discarded
    pub min_candidate_score: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_candidate_score: 0.10,
        }
    }
}

/// Top-level coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub dispatch: DispatchConfig,
    pub quality: QualityConfig,
    pub health: HealthConfig,
    pub selection: SelectionConfig,
    /// Coordination summaries kept in memory
    pub history_capacity: usize,
    /// Broadcast buffer for coordination events
    pub event_channel_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            quality: QualityConfig::default(),
            health: HealthConfig::default(),
            selection: SelectionConfig::default(),
            history_capacity: 100,
            event_channel_capacity: 256,
        }
    }
}

impl CoordinationConfig {
    /// Defaults overlaid with `COORD_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable config override");
                    None
                }
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        if let Some(v) = parsed(lookup, "COORD_GROUP_TIMEOUT_MS") {
            self.dispatch.group_timeout_ms = v;
        }
        if let Some(v) = parsed(lookup, "COORD_WORKER_TIMEOUT_MS") {
            self.dispatch.worker_timeout_ms = v;
        }
        if let Some(v) = parsed(lookup, "COORD_MAX_RETRIES") {
            self.dispatch.max_retries = v;
        }
        if let Some(v) = parsed(lookup, "COORD_RETRY_BASE_DELAY_MS") {
            self.dispatch.retry_base_delay_ms = v;
        }
        if let Some(v) = parsed(lookup, "COORD_HISTORY_CAPACITY") {
            self.history_capacity = v;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatch.group_timeout_ms == 0 {
            return Err(invalid("dispatch.group_timeout_ms", "must be positive"));
        }
        if self.dispatch.worker_timeout_ms == 0 {
            return Err(invalid("dispatch.worker_timeout_ms", "must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", "must be at least 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity", "must be at least 1"));
        }
        for (field, value) in [
            ("quality.min_confidence", self.quality.min_confidence),
            ("health.min_success_rate", self.health.min_success_rate),
            (
                "selection.min_candidate_score",
                self.selection.min_candidate_score,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
