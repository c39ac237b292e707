//! Configuration module for feedwatch.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::feed::DEFAULT_INITIAL_BATCH;
use crate::{FeedwatchError, Result};

/// Subscription store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one record file per subscription.
    #[serde(default = "default_store_directory")]
    pub directory: String,
}

fn default_store_directory() -> String {
    "data/subscriptions".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: default_store_directory(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum outbound feed fetches per minute, process-wide.
    #[serde(default = "default_max_fetches_per_minute")]
    pub max_fetches_per_minute: u32,
    /// Maximum number of polls in flight at once.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Number of items fetched by the enrollment run of a new subscription.
    #[serde(default = "default_initial_batch_size")]
    pub initial_batch_size: usize,
}

fn default_max_fetches_per_minute() -> u32 {
    6
}

fn default_worker_pool_size() -> usize {
    20
}

fn default_initial_batch_size() -> usize {
    DEFAULT_INITIAL_BATCH
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_fetches_per_minute: default_max_fetches_per_minute(),
            worker_pool_size: default_worker_pool_size(),
            initial_batch_size: default_initial_batch_size(),
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Query parameter appended to every feed query to select the feed format.
    #[serde(default = "default_format_param")]
    pub format_param: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum description length in characters.
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_format_param() -> String {
    "format=rss".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_description_length() -> usize {
    10000
}

fn default_user_agent() -> String {
    concat!("feedwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

impl FeedConfig {
    /// Connection timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Total request timeout as a duration.
    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            format_param: default_format_param(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            max_description_length: default_max_description_length(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedwatch.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Subscription store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Feed fetching configuration.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedwatchError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedwatchError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDWATCH_STORE_DIR`: Override the subscription store directory
    /// - `FEEDWATCH_MAX_FETCHES_PER_MINUTE`: Override the global fetch rate
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FEEDWATCH_STORE_DIR") {
            if !dir.is_empty() {
                self.store.directory = dir;
            }
        }

        if let Ok(rate) = std::env::var("FEEDWATCH_MAX_FETCHES_PER_MINUTE") {
            match rate.parse::<u32>() {
                Ok(rate) => self.scheduler.max_fetches_per_minute = rate,
                Err(_) => {
                    tracing::warn!("Ignoring invalid FEEDWATCH_MAX_FETCHES_PER_MINUTE: {rate}")
                }
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_fetches_per_minute == 0 {
            return Err(FeedwatchError::Validation(
                "scheduler.max_fetches_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.worker_pool_size == 0 {
            return Err(FeedwatchError::Validation(
                "scheduler.worker_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.initial_batch_size == 0 {
            return Err(FeedwatchError::Validation(
                "scheduler.initial_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.store.directory.trim().is_empty() {
            return Err(FeedwatchError::Validation(
                "store.directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
