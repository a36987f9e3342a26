//! `coordinator.toml` loading
//!
//! ```toml
//! [coordination.dispatch]
//! group_timeout_ms = 20000
//!
//! [[workers]]
//! type = "data"
//! instances = 2
//! capabilities = ["pandas", "sql"]
//! confidence = 0.8
//! latency_ms = 150
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use team_coordination::CoordinationConfig;

/// One demo worker type and how many instances to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    #[serde(rename = "type")]
    pub worker_type: String,
    #[serde(default = "default_instances")]
    pub instances: usize,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Confidence reported on every answer
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Simulated processing time
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_instances() -> usize {
    1
}

fn default_confidence() -> f64 {
    0.8
}

impl WorkerSpec {
    pub fn new(worker_type: &str, capabilities: &[&str], confidence: f64) -> Self {
        Self {
            worker_type: worker_type.to_string(),
            instances: 1,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            confidence,
            latency_ms: 0,
        }
    }
}

/// Top-level CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub coordination: CoordinationConfig,
    pub workers: Vec<WorkerSpec>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            coordination: CoordinationConfig::default(),
            workers: vec![
                WorkerSpec::new("code", &["python", "rust", "debugging", "testing"], 0.8),
                WorkerSpec::new("data", &["pandas", "sql", "statistics"], 0.75),
                WorkerSpec::new("visualization", &["matplotlib", "plotly"], 0.7),
                WorkerSpec::new("research", &["literature", "citations"], 0.65),
            ],
        }
    }
}

impl CliConfig {
    /// Built-in workers, coordination defaults overlaid with `COORD_*` variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.coordination.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse coordinator config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.coordination.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordination.validate()?;
        if self.workers.is_empty() {
            bail!("at least one [[workers]] entry is required");
        }
        for spec in &self.workers {
            if spec.worker_type.trim().is_empty() {
                bail!("worker type must not be empty");
            }
            if spec.instances == 0 {
                bail!("worker type {} needs at least one instance", spec.worker_type);
            }
            if !(0.0..=1.0).contains(&spec.confidence) {
                bail!(
                    "worker type {} confidence {} is outside [0, 1]",
                    spec.worker_type,
                    spec.confidence
                );
            }
        }
        Ok(())
    }
}
