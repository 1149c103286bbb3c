//! Meterbook configuration
//!
//! Sources, later ones win:
//! 1. Built-in defaults
//! 2. Optional config file (`meterbook.toml` or `--config`)
//! 3. `METERBOOK_` environment variables, nested with `__`
//!    (e.g. `METERBOOK_DATABASE__URL`)
//!
//! A `.env` file is loaded into the environment first if present.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use meterbook_store::PoolConfig;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "METERBOOK";
const DEFAULT_FILE: &str = "meterbook";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterbookConfig {
    pub database: DatabaseSettings,
    pub prometheus: PrometheusSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://reporting@localhost/reporting?sslmode=disable".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseSettings {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusSettings {
    pub url: String,
    /// Per-query timeout, unbounded when unset
    pub query_timeout_secs: Option<u64>,
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            query_timeout_secs: None,
        }
    }
}

impl PrometheusSettings {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive, `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MeterbookConfig {
    /// Load configuration from the environment and an optional file
    pub fn load(file: Option<&Path>) -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();
        Self::load_from(file, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    fn load_from(file: Option<&Path>, env: Environment) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };

        Config::builder()
            .add_source(file_source)
            .add_source(env)
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}
