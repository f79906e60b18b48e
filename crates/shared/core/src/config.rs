//! Client configuration
//!
//! `Config` is immutable: it is produced by [`ConfigBuilder::build`], which
//! validates every field, and exposes only getters. [`ConfigFile`] is the
//! serde form used when options come from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Demo account endpoint
pub const DEMO_URL: &str = "wss://demo-api-eu.po.market/socket.io/?EIO=4&transport=websocket";

/// Real account endpoints, tried in order
pub const REAL_URLS: &[&str] = &[
    "wss://api-eu.po.market/socket.io/?EIO=4&transport=websocket",
    "wss://api-l.po.market/socket.io/?EIO=4&transport=websocket",
    "wss://api-us-north.po.market/socket.io/?EIO=4&transport=websocket",
    "wss://api-fin.po.market/socket.io/?EIO=4&transport=websocket",
];

fn default_max_allowed_loops() -> u32 {
    100
}

fn default_sleep_interval_ms() -> u64 {
    100
}

fn default_reconnect_time_secs() -> u64 {
    5
}

fn default_connection_initialization_timeout_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_extra_duration_secs() -> u64 {
    5
}

/// Validated, immutable client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    max_allowed_loops: u32,
    sleep_interval: Duration,
    reconnect_time: Duration,
    connection_initialization_timeout: Duration,
    timeout: Duration,
    extra_duration: Duration,
    urls: Vec<Url>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Upper bound on consecutive reconnect attempts and correlated retries
    pub fn max_allowed_loops(&self) -> u32 {
        self.max_allowed_loops
    }

    /// Pause between retry attempts of a correlated send
    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// Pause before each reconnect attempt
    pub fn reconnect_time(&self) -> Duration {
        self.reconnect_time
    }

    /// Deadline for one connect + handshake attempt
    pub fn connection_initialization_timeout(&self) -> Duration {
        self.connection_initialization_timeout
    }

    /// Default deadline for correlated requests
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Added to every check-win wait budget
    pub fn extra_duration(&self) -> Duration {
        self.extra_duration
    }

    /// Explicitly configured endpoints (may be empty)
    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// Endpoints to connect to: the configured ones, or the platform
    /// defaults for the account type when none were given.
    pub fn resolve_urls(&self, demo: bool) -> Vec<Url> {
        if !self.urls.is_empty() {
            return self.urls.clone();
        }
        let defaults: &[&str] = if demo { &[DEMO_URL] } else { REAL_URLS };
        defaults
            .iter()
            .filter_map(|raw| Url::parse(raw).ok())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_allowed_loops: default_max_allowed_loops(),
            sleep_interval: Duration::from_millis(default_sleep_interval_ms()),
            reconnect_time: Duration::from_secs(default_reconnect_time_secs()),
            connection_initialization_timeout: Duration::from_secs(
                default_connection_initialization_timeout_secs(),
            ),
            timeout: Duration::from_secs(default_timeout_secs()),
            extra_duration: Duration::from_secs(default_extra_duration_secs()),
            urls: Vec::new(),
        }
    }
}

/// Chained builder for [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    max_allowed_loops: u32,
    sleep_interval: Duration,
    reconnect_time: Duration,
    connection_initialization_timeout: Duration,
    timeout: Duration,
    extra_duration: Duration,
    urls: Vec<String>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        let config = Config::default();
        Self {
            max_allowed_loops: config.max_allowed_loops,
            sleep_interval: config.sleep_interval,
            reconnect_time: config.reconnect_time,
            connection_initialization_timeout: config.connection_initialization_timeout,
            timeout: config.timeout,
            extra_duration: config.extra_duration,
            urls: Vec::new(),
        }
    }
}

impl ConfigBuilder {
    pub fn max_allowed_loops(mut self, loops: u32) -> Self {
        self.max_allowed_loops = loops;
        self
    }

    pub fn sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn reconnect_time(mut self, time: Duration) -> Self {
        self.reconnect_time = time;
        self
    }

    pub fn connection_initialization_timeout(mut self, timeout: Duration) -> Self {
        self.connection_initialization_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn extra_duration(mut self, extra: Duration) -> Self {
        self.extra_duration = extra;
        self
    }

    /// Append a candidate endpoint
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Replace the candidate endpoints
    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if self.max_allowed_loops == 0 {
            return Err(ConfigError::ZeroLoops);
        }
        for (field, value) in [
            ("sleep_interval", self.sleep_interval),
            (
                "connection_initialization_timeout",
                self.connection_initialization_timeout,
            ),
            ("timeout", self.timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        let urls = self
            .urls
            .iter()
            .map(|raw| parse_ws_url(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            max_allowed_loops: self.max_allowed_loops,
            sleep_interval: self.sleep_interval,
            reconnect_time: self.reconnect_time,
            connection_initialization_timeout: self.connection_initialization_timeout,
            timeout: self.timeout,
            extra_duration: self.extra_duration,
            urls,
        })
    }
}

/// Parse and check that an endpoint is a websocket url
pub fn parse_ws_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Serde form of the configuration (durations as integers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_max_allowed_loops")]
    pub max_allowed_loops: u32,
    #[serde(default = "default_sleep_interval_ms")]
    pub sleep_interval_ms: u64,
    #[serde(default = "default_reconnect_time_secs")]
    pub reconnect_time_secs: u64,
    #[serde(default = "default_connection_initialization_timeout_secs")]
    pub connection_initialization_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_extra_duration_secs")]
    pub extra_duration_secs: u64,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            max_allowed_loops: default_max_allowed_loops(),
            sleep_interval_ms: default_sleep_interval_ms(),
            reconnect_time_secs: default_reconnect_time_secs(),
            connection_initialization_timeout_secs: default_connection_initialization_timeout_secs(
            ),
            timeout_secs: default_timeout_secs(),
            extra_duration_secs: default_extra_duration_secs(),
            urls: Vec::new(),
        }
    }
}

impl ConfigFile {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder::default()
            .max_allowed_loops(self.max_allowed_loops)
            .sleep_interval(Duration::from_millis(self.sleep_interval_ms))
            .reconnect_time(Duration::from_secs(self.reconnect_time_secs))
            .connection_initialization_timeout(Duration::from_secs(
                self.connection_initialization_timeout_secs,
            ))
            .timeout(Duration::from_secs(self.timeout_secs))
            .extra_duration(Duration::from_secs(self.extra_duration_secs))
            .urls(self.urls)
    }
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        file.into_builder().build()
    }
}
