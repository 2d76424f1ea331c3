//! Client configuration

use crate::error::{ClientError, Result};
use std::time::Duration;

/// Environment variable holding the backend base URL
pub const ENV_URL: &str = "ATHLEHUB_URL";
/// Environment variable holding the anonymous API key
pub const ENV_ANON_KEY: &str = "ATHLEHUB_ANON_KEY";
/// Optional environment variable with a request deadline in seconds
pub const ENV_TIMEOUT_SECS: &str = "ATHLEHUB_TIMEOUT_SECS";

/// Configuration for the data-access client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://project.supabase.co` (no trailing slash needed)
    pub base_url: String,

    /// Project API key. Sent as `apikey` on every request and used as the
    /// bearer credential when nobody is signed in.
    pub api_key: String,

    /// Deadline applied to every request unless a builder overrides it.
    /// Default: none
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Load from `ATHLEHUB_URL`, `ATHLEHUB_ANON_KEY` and `ATHLEHUB_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_URL)
            .map_err(|_| ClientError::Configuration(format!("{ENV_URL} is not set")))?;
        let api_key = std::env::var(ENV_ANON_KEY)
            .map_err(|_| ClientError::Configuration(format!("{ENV_ANON_KEY} is not set")))?;

        let mut config = Self::new(base_url, api_key);
        if let Ok(secs) = std::env::var(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|e| {
                ClientError::Configuration(format!("{ENV_TIMEOUT_SECS} is not a number: {e}"))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Configuration(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(ClientError::Configuration("API key is empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn rest_url(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, resource)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }
}
