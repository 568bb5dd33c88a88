//! Pipeline configuration: collaborator timeouts and the HTTP endpoint.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use fledger_core::config::parse_or;

/// Default budget for one validate or save call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the asynchronous validate → save pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget for one validation call; expiry is a transport failure.
    #[serde(rename = "validate_timeout_ms", deserialize_with = "millis")]
    pub validate_timeout: Duration,
    /// Budget for one save call; expiry is a transport failure.
    #[serde(rename = "save_timeout_ms", deserialize_with = "millis")]
    pub save_timeout: Duration,
    /// Base URL of the adjustments API (e.g. `https://forecast.example.com/api`).
    pub api_base_url: Option<String>,
    /// Bearer token attached to API requests.
    pub api_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate_timeout: DEFAULT_TIMEOUT,
            save_timeout: DEFAULT_TIMEOUT,
            api_base_url: None,
            api_token: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout = |key: &str, default: Duration| {
            Duration::from_millis(parse_or(&lookup, key, default.as_millis() as u64, |ms| *ms > 0))
        };

        Self {
            validate_timeout: timeout("FLEDGER_VALIDATE_TIMEOUT_MS", defaults.validate_timeout),
            save_timeout: timeout("FLEDGER_SAVE_TIMEOUT_MS", defaults.save_timeout),
            api_base_url: non_empty("FORECAST_API_URL"),
            api_token: non_empty("FORECAST_API_TOKEN"),
        }
    }

    pub fn with_validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub fn with_api(mut self, base_url: impl Into<String>, token: Option<String>) -> Self {
        self.api_base_url = Some(base_url.into());
        self.api_token = token;
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
