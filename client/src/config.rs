//! Configuration management for the client.

use std::env;
use std::time::Duration;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server URL including the mount path, e.g. `http://localhost:1337/parse`
    pub server_url: String,
    /// Application id sent with every request
    pub app_id: String,
    /// REST API key
    pub rest_key: Option<String>,
    /// Master key, only sent when the client is switched to master key mode
    pub master_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Config {
    pub fn new(server_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            app_id: app_id.into(),
            rest_key: None,
            master_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_rest_key(mut self, rest_key: impl Into<String>) -> Self {
        self.rest_key = Some(rest_key.into());
        self
    }

    pub fn with_master_key(mut self, master_key: impl Into<String>) -> Self {
        self.master_key = Some(master_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = env::var("PARSE_SERVER_URL").map_err(|_| ConfigError::MissingServerUrl)?;
        let app_id = env::var("PARSE_APP_ID").map_err(|_| ConfigError::MissingAppId)?;

        let rest_key = env::var("PARSE_REST_KEY").ok();
        let master_key = env::var("PARSE_MASTER_KEY").ok();

        let timeout = env::var("PARSE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidTimeout)?;

        let config = Self {
            server_url,
            app_id,
            rest_key,
            master_key,
            timeout,
        };
        config.mount_path()?;
        Ok(config)
    }

    /// Path component of the server URL without a trailing slash, e.g.
    /// `/parse`. Batch requests address sub-requests by this path.
    pub fn mount_path(&self) -> Result<String, ConfigError> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|_| ConfigError::InvalidServerUrl(self.server_url.clone()))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidServerUrl(self.server_url.clone()));
        }
        Ok(url.path().trim_end_matches('/').to_string())
    }

    /// Absolute URL of an endpoint below the server URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PARSE_SERVER_URL environment variable is required")]
    MissingServerUrl,

    #[error("PARSE_APP_ID environment variable is required")]
    MissingAppId,

    #[error("Invalid PARSE_TIMEOUT_SECS value")]
    InvalidTimeout,

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),
}
