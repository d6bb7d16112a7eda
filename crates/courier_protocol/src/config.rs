//! Runtime configuration for Courier

use crate::defaults::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Required configuration {0} is missing")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Main configuration for the ingestion pipeline and its scheduler
#[derive(Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Watched directory
    #[serde(default = "default_directory_path")]
    pub directory_path: PathBuf,

    /// Aidbox REST API base URL
    #[serde(default = "default_aidbox_base_url")]
    pub aidbox_base_url: String,

    #[serde(default)]
    pub aidbox_username: String,

    #[serde(default)]
    pub aidbox_password: String,

    #[serde(default = "default_log_file_path")]
    pub log_file_path: PathBuf,

    /// Tracking file; may live inside the watched directory
    #[serde(default = "default_processed_files_path")]
    pub processed_files_path: PathBuf,

    /// Pause between batches
    #[serde(default = "default_schedule_interval")]
    pub schedule_interval_secs: u64,

    /// Fixed delay used by every endless-retry loop
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Per-request network timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts per delivery burst before falling back to the retry delay
    #[serde(default = "default_send_burst_attempts")]
    pub send_burst_attempts: u32,

    /// Whether dotfiles in the watched directory are candidates
    #[serde(default = "default_include_hidden")]
    pub include_hidden: bool,
}

fn default_directory_path() -> PathBuf {
    PathBuf::from(DEFAULT_DIRECTORY_PATH)
}

fn default_aidbox_base_url() -> String {
    DEFAULT_AIDBOX_BASE_URL.to_string()
}

fn default_log_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE_PATH)
}

fn default_processed_files_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROCESSED_FILES_PATH)
}

fn default_schedule_interval() -> u64 {
    DEFAULT_SCHEDULE_INTERVAL_SECS
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_send_burst_attempts() -> u32 {
    DEFAULT_SEND_BURST_ATTEMPTS
}

fn default_include_hidden() -> bool {
    true
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            directory_path: default_directory_path(),
            aidbox_base_url: default_aidbox_base_url(),
            aidbox_username: String::new(),
            aidbox_password: String::new(),
            log_file_path: default_log_file_path(),
            processed_files_path: default_processed_files_path(),
            schedule_interval_secs: default_schedule_interval(),
            retry_delay_secs: default_retry_delay(),
            request_timeout_secs: default_request_timeout(),
            send_burst_attempts: default_send_burst_attempts(),
            include_hidden: default_include_hidden(),
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for CourierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourierConfig")
            .field("directory_path", &self.directory_path)
            .field("aidbox_base_url", &self.aidbox_base_url)
            .field("aidbox_username", &self.aidbox_username)
            .field("aidbox_password", &"<redacted>")
            .field("log_file_path", &self.log_file_path)
            .field("processed_files_path", &self.processed_files_path)
            .field("schedule_interval_secs", &self.schedule_interval_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("send_burst_attempts", &self.send_burst_attempts)
            .field("include_hidden", &self.include_hidden)
            .finish()
    }
}

impl CourierConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check that the values needed to talk to the endpoint are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aidbox_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("AIDBOX_BASE_URL"));
        }
        if !self.aidbox_base_url.starts_with("http://")
            && !self.aidbox_base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                field: "AIDBOX_BASE_URL",
                message: format!("'{}' is not an http(s) URL", self.aidbox_base_url),
            });
        }
        if self.aidbox_username.is_empty() || self.aidbox_password.is_empty() {
            return Err(ConfigError::Missing("AIDBOX_USERNAME and AIDBOX_PASSWORD"));
        }
        for (field, value) in [
            ("SCHEDULE_INTERVAL", self.schedule_interval_secs),
            ("RETRY_DELAY_SECONDS", self.retry_delay_secs),
            ("REQUEST_TIMEOUT_SECONDS", self.request_timeout_secs),
        ] {
            // Zero turns the scheduler and the endless retry loops into busy loops.
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1 second".to_string(),
                });
            }
        }
        if self.send_burst_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "send_burst_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full URL of the HL7v2 message resource.
    pub fn message_endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.aidbox_base_url.trim_end_matches('/'),
            HL7V2_MESSAGE_ENDPOINT
        )
    }
}
