//! Configuration module for kappa-pan
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Credentials are usually
//! injected through the environment rather than written into the file:
//!
//! ```yaml
//! api:
//!   base_url: https://open-api.123pan.com
//!   client_id: ${PAN123_CLIENT_ID}
//!   client_secret: ${PAN123_CLIENT_SECRET}
//! upload:
//!   retry_limit: 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Treat empty strings and unexpanded `${VAR}` placeholders as absent.
fn provided(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty() && !v.starts_with("${"))
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.api.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid base_url '{}': must start with http:// or https://",
                self.api.base_url
            )));
        }

        let has_token = provided(&self.api.access_token).is_some();
        let has_client_pair = provided(&self.api.client_id).is_some()
            && provided(&self.api.client_secret).is_some();
        if !has_token && !has_client_pair {
            return Err(ConfigError::ValidationError(
                "Either access_token or both client_id and client_secret must be set".into(),
            ));
        }

        if self.api.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be greater than zero".into(),
            ));
        }

        if self.upload.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Pre-issued access token. Optional when client credentials are set.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl ApiConfig {
    /// Access token, if a usable one was configured.
    pub fn access_token(&self) -> Option<&str> {
        provided(&self.access_token)
    }

    /// Client credential pair, if a usable one was configured.
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        match (provided(&self.client_id), provided(&self.client_secret)) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            client_id: None,
            client_secret: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Upload behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Retries per chunk after the first attempt. Zero disables retries.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Interval between async completion polls, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://open-api.123pan.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_retry_limit() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token() -> Config {
        Config {
            api: ApiConfig {
                access_token: Some("token".into()),
                ..ApiConfig::default()
            },
            upload: UploadConfig::default(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://open-api.123pan.com");
        assert_eq!(config.upload.retry_limit, 3);
        assert_eq!(config.upload.poll_interval_secs, 2);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = Config::default();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_accepts_access_token() {
        let config = config_with_token();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_client_credentials() {
        let config = Config {
            api: ApiConfig {
                client_id: Some("id".into()),
                client_secret: Some("secret".into()),
                ..ApiConfig::default()
            },
            upload: UploadConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = config_with_token();
        config.api.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = config_with_token();
        config.upload.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unexpanded_placeholder_counts_as_missing() {
        let config = Config {
            api: ApiConfig {
                access_token: Some("${PAN123_ACCESS_TOKEN}".into()),
                ..ApiConfig::default()
            },
            upload: UploadConfig::default(),
        };
        assert!(config.api.access_token().is_none());
        assert!(config.validate().is_err());
    }
}
