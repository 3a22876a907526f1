//! Configuration for the execution engine and job manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Execution engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of jobs executing at once.
    pub max_concurrency: usize,
    /// How long a finished job stays in the submission set (milliseconds).
    pub finished_retention_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            finished_retention_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_finished_retention(mut self, retention: Duration) -> Self {
        self.finished_retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn finished_retention(&self) -> Duration {
        Duration::from_millis(self.finished_retention_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Job manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub engine: EngineConfig,
    /// Timeout for request/reply calls into the actors (milliseconds).
    pub rpc_timeout_ms: u64,
    /// Capacity of the list event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            rpc_timeout_ms: 5_000,
            event_capacity: 1024,
        }
    }
}

impl ManagerConfig {
    pub const ENV_MAX_CONCURRENCY: &'static str = "JOBQUEUE_MAX_CONCURRENCY";
    pub const ENV_RETENTION_MS: &'static str = "JOBQUEUE_RETENTION_MS";
    pub const ENV_RPC_TIMEOUT_MS: &'static str = "JOBQUEUE_RPC_TIMEOUT_MS";

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.engine.max_concurrency = max_concurrency;
        self
    }

    pub fn with_finished_retention(mut self, retention: Duration) -> Self {
        self.engine = self.engine.with_finished_retention(retention);
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Defaults overridden by `JOBQUEUE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ManagerConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, Self::ENV_MAX_CONCURRENCY)? {
            config.engine.max_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, Self::ENV_RETENTION_MS)? {
            config.engine.finished_retention_ms = v;
        }
        if let Some(v) = parse_var(&lookup, Self::ENV_RPC_TIMEOUT_MS)? {
            config.rpc_timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
