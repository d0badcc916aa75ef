use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::http_client::{AgentTimeouts, RetryPolicy};
use crate::session::types::CalculationMode;

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const MIB: usize = 1024 * 1024;

/// Settings stored in `config.toml`.
///
/// Config keys (TOML): `service` (with nested `service.retry`) and `session`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Where the Evaluation Service lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Base URL; endpoints and plot paths resolve against it.
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Also bounds the server-side evaluation, which precedes the first response byte.
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_response_bytes: usize,
    pub max_plot_bytes: usize,
    pub retry: RetrySettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
            write_timeout_secs: 300,
            max_response_bytes: 32 * MIB,
            max_plot_bytes: 32 * MIB,
            retry: RetrySettings::default(),
        }
    }
}

impl ServiceSettings {
    /// Parse and normalize `base_url` so relative joins keep its path.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(self.base_url.trim()).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("not a base URL".into()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub(crate) fn timeouts(&self) -> AgentTimeouts {
        AgentTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
            write: Duration::from_secs(self.write_timeout_secs),
        }
    }

    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        let timeouts = [
            ("service.connect_timeout_secs", self.connect_timeout_secs),
            ("service.read_timeout_secs", self.read_timeout_secs),
            ("service.write_timeout_secs", self.write_timeout_secs),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.max_response_bytes == 0 || self.max_plot_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "service.max_response_bytes",
                reason: "byte limits must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "service.retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Bounded retry for transport failures. One attempt means no retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl RetrySettings {
    pub(crate) fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.base_delay_ms),
            delay_cap: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Defaults applied to a fresh evaluation session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub default_calc_mode: CalculationMode,
    /// Metrics pre-selected when a session starts.
    pub default_metrics: Vec<String>,
}

/// Errors that may occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// The service base URL is unusable.
    #[error("Invalid service base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// A setting is out of range.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    /// No usable config directory found.
    #[error("Application directory unavailable: {0}")]
    AppDir(#[from] crate::app_dirs::AppDirError),
}
