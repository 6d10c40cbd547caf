//! Configuration for clients and waiters.
//!
//! Every field is optional; missing values fall back to the library defaults.
//! A typical file:
//!
//! ```toml
//! [client]
//! endpoint = "https://goldengate.us-ashburn-1.oci.oraclecloud.com"
//! request_timeout_secs = 60
//!
//! [client.retry]
//! max_attempts = 4
//!
//! [polling]
//! max_interval_secs = 30
//! max_wait_secs = 1200
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::error::PolicyError;
use crate::policy::{
    PollingPolicy, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL, DEFAULT_MAX_TOTAL_WAIT,
};
use crate::rest::RetryConfig;

/// API version used for work request paths when none is configured.
pub const DEFAULT_API_VERSION: &str = "20200407";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid polling settings: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub client: ClientConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub initial_interval_secs: Option<u64>,
    pub max_interval_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.polling.to_policy()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&contents)
    }
}

impl ClientConfig {
    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        }
    }
}

impl PollingConfig {
    /// Validated policy; unset fields take the defaults.
    pub fn to_policy(&self) -> Result<PollingPolicy, PolicyError> {
        let max_interval = self
            .max_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_INTERVAL);
        let max_wait = self
            .max_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_TOTAL_WAIT);
        let initial = self
            .initial_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| DEFAULT_INITIAL_INTERVAL.min(max_interval));
        PollingPolicy::with_intervals(initial, max_interval, max_wait)
    }
}
