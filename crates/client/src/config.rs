use std::time::Duration;

/// Base URL used when `VACAL_API_URL` is not set (local development).
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default period of the single-task status poll.
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 2000;

/// Default period of the task history poll.
pub const DEFAULT_HISTORY_INTERVAL_MS: u64 = 3000;

/// Client configuration loaded from environment variables.
///
/// All fields default to values suitable for local development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Task service base URL, without a trailing slash.
    pub api_url: String,
    /// Period of the selected task's status poll.
    pub status_interval: Duration,
    /// Period of the task history poll.
    pub history_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            status_interval: Duration::from_millis(DEFAULT_STATUS_INTERVAL_MS),
            history_interval: Duration::from_millis(DEFAULT_HISTORY_INTERVAL_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `VACAL_API_URL`            | `http://localhost:8000` |
    /// | `STATUS_POLL_INTERVAL_MS`  | `2000`                  |
    /// | `HISTORY_POLL_INTERVAL_MS` | `3000`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("VACAL_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(api_url));
        }

        let status_interval =
            interval_ms(&lookup, "STATUS_POLL_INTERVAL_MS", DEFAULT_STATUS_INTERVAL_MS)?;
        let history_interval =
            interval_ms(&lookup, "HISTORY_POLL_INTERVAL_MS", DEFAULT_HISTORY_INTERVAL_MS)?;

        Ok(Self {
            api_url,
            status_interval,
            history_interval,
        })
    }
}

fn interval_ms<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(Duration::from_millis(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidInterval { key, value: raw }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("VACAL_API_URL must be an http(s) URL, got '{0}'")]
    InvalidUrl(String),

    #[error("{key} must be a positive number of milliseconds, got '{value}'")]
    InvalidInterval { key: &'static str, value: String },
}
