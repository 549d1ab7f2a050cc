//! Configuration for the channel sync service

use crate::{Error, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use channel_core::StorageConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Reconciliation loop
    pub sync: SyncConfig,

    /// Persistence
    pub storage: StorageConfig,

    /// Logging
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "channel-sync".to_string(),
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tick period (milliseconds)
    pub interval_ms: u64,

    /// Deadline for each daemon call (milliseconds)
    pub daemon_timeout_ms: u64,

    /// Deadline for each explorer call (milliseconds)
    pub explorer_timeout_ms: u64,

    /// Storage retry policy
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            daemon_timeout_ms: 30_000,
            explorer_timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Tick period
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Daemon call deadline
    pub fn daemon_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon_timeout_ms)
    }

    /// Explorer call deadline
    pub fn explorer_timeout(&self) -> Duration {
        Duration::from_millis(self.explorer_timeout_ms)
    }
}

/// Bounded exponential retry for storage operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First delay (milliseconds)
    pub initial_interval_ms: u64,

    /// Delay ceiling (milliseconds)
    pub max_interval_ms: u64,

    /// Give up after this long (milliseconds)
    pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 50,
            max_interval_ms: 500,
            max_elapsed_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Fresh backoff schedule
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(self.max_elapsed_ms)))
            .build()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.storage.apply_env();

        if let Some(interval) = env_parse("HUB_SYNC_INTERVAL_MS")? {
            config.sync.interval_ms = interval;
        }

        if let Some(timeout) = env_parse("HUB_DAEMON_TIMEOUT_MS")? {
            config.sync.daemon_timeout_ms = timeout;
        }

        if let Some(timeout) = env_parse("HUB_EXPLORER_TIMEOUT_MS")? {
            config.sync.explorer_timeout_ms = timeout;
        }

        if let Ok(level) = std::env::var("HUB_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(json) = env_parse("HUB_LOG_JSON")? {
            config.logging.json = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_ms == 0 {
            return Err(Error::Config("sync.interval_ms must be positive".to_string()));
        }
        if self.sync.daemon_timeout_ms == 0 || self.sync.explorer_timeout_ms == 0 {
            return Err(Error::Config("call timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
