//! Configuration types for report-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable overriding [`ServiceConfig::base_url`]
pub const ENV_API_URL: &str = "REPORT_DL_API_URL";

/// Environment variable providing [`ServiceConfig::auth_token`]
pub const ENV_AUTH_TOKEN: &str = "REPORT_DL_TOKEN";

/// Job service connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the job service (default: "http://localhost:8000")
    ///
    /// Job endpoints are resolved relative to it, so a path prefix such as
    /// `https://api.example.com/tools/` is kept.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Upper bound on a single request, including reading the body (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            request_timeout: default_request_timeout(),
        }
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Poll loop settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between the end of one status request and the start of the next (default: 2000 ms)
    #[serde(
        default = "default_poll_interval",
        rename = "interval_ms",
        with = "duration_ms_serde"
    )]
    pub interval: Duration,

    /// Ask the server to abort the job when the consumer cancels (default: false)
    ///
    /// Off by default: cancelling only detaches the client and the job keeps
    /// running remotely.
    #[serde(default)]
    pub notify_server_on_cancel: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            notify_server_on_cancel: false,
        }
    }
}

/// Where and how finished artifacts are saved
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Tool name used for default artifact names, `<tool>_result.<ext>` (default: "wansoft")
    #[serde(default = "default_tool_name")]
    pub tool_name: String,

    /// Directory artifacts are written to (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// What to do when the artifact's filename already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tool_name: default_tool_name(),
            download_dir: default_download_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Refuse to save, keep existing
    Skip,
}

/// Main configuration for [`JobRunner`](crate::JobRunner)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Job service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Poll loop behavior
    #[serde(default)]
    pub polling: PollingConfig,

    /// Artifact naming and storage
    #[serde(default)]
    pub output: OutputConfig,

    /// Capacity of the state broadcast channel (default: 256)
    ///
    /// Slow subscribers that fall further behind than this miss intermediate
    /// snapshots but can always read the latest state.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            polling: PollingConfig::default(),
            output: OutputConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Default configuration with environment overrides applied
    ///
    /// Reads [`ENV_API_URL`] and [`ENV_AUTH_TOKEN`]; unset or empty
    /// variables leave the defaults in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.service.base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.service.auth_token = Some(token.trim().to_string());
        }
    }

    /// Check settings that would otherwise only fail mid-run
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.service.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.service.base_url, e),
            key: Some("base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base URL must be http or https, got '{}'", url.scheme()),
                key: Some("base_url".to_string()),
            });
        }
        if self.service.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request timeout must be greater than zero".to_string(),
                key: Some("request_timeout".to_string()),
            });
        }
        if self.polling.interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".to_string(),
                key: Some("interval_ms".to_string()),
            });
        }
        if self.output.tool_name.trim().is_empty() {
            return Err(Error::Config {
                message: "tool name must not be empty".to_string(),
                key: Some("tool_name".to_string()),
            });
        }
        if self.event_capacity == 0 {
            return Err(Error::Config {
                message: "event capacity must be at least 1".to_string(),
                key: Some("event_capacity".to_string()),
            });
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_tool_name() -> String {
    "wansoft".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_event_capacity() -> usize {
    256
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
