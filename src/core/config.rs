use std::time::Duration;

use super::feed::fetcher::{Relay, DEFAULT_FEED_BASE_URL};

pub const FEED_BASE_URL_KEY: &str = "TRENDWATCH_FEED_BASE_URL";
pub const RELAYS_KEY: &str = "TRENDWATCH_RELAYS";
pub const REFRESH_SECS_KEY: &str = "TRENDWATCH_REFRESH_SECS";
pub const TIMEOUT_SECS_KEY: &str = "TRENDWATCH_TIMEOUT_SECS";

const DEFAULT_REFRESH_SECS: u64 = 15 * 60;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a whole number of seconds, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    ZeroDuration { key: &'static str },
    #[error("unknown relay {0:?} (expected allorigins, thingproxy, codetabs, direct or name=template)")]
    UnknownRelay(String),
    #[error("relay template for {name:?} needs a {{url}} or {{encoded}} placeholder")]
    InvalidRelayTemplate { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendwatchConfig {
    pub feed_base_url: String,
    pub relays: Vec<Relay>,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for TrendwatchConfig {
    fn default() -> Self {
        Self {
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            relays: Relay::default_chain(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl TrendwatchConfig {
    /// Reads `.env.local` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::from_filename(".env.local");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(base_url) = read(FEED_BASE_URL_KEY) {
            config.feed_base_url = base_url.trim().to_string();
        }
        if let Some(raw) = read(RELAYS_KEY) {
            config.relays = parse_relays(&raw)?;
        }
        if let Some(raw) = read(REFRESH_SECS_KEY) {
            config.refresh_interval = parse_seconds(REFRESH_SECS_KEY, &raw)?;
        }
        if let Some(raw) = read(TIMEOUT_SECS_KEY) {
            config.request_timeout = parse_seconds(TIMEOUT_SECS_KEY, &raw)?;
        }
        Ok(config)
    }

    pub fn with_refresh_secs(mut self, secs: u64) -> Result<Self, ConfigError> {
        if secs == 0 {
            return Err(ConfigError::ZeroDuration {
                key: REFRESH_SECS_KEY,
            });
        }
        self.refresh_interval = Duration::from_secs(secs);
        Ok(self)
    }
}

/// Entries are either a built-in relay name or `name=template`, where the
/// template holds `{url}` or `{encoded}`.
fn parse_relays(raw: &str) -> Result<Vec<Relay>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_relay_entry)
        .collect()
}

fn parse_relay_entry(entry: &str) -> Result<Relay, ConfigError> {
    let Some((name, template)) = entry.split_once('=') else {
        return Relay::from_name(entry).ok_or_else(|| ConfigError::UnknownRelay(entry.to_string()));
    };
    let (name, template) = (name.trim(), template.trim());
    if name.is_empty() {
        return Err(ConfigError::UnknownRelay(entry.to_string()));
    }
    if !template.contains("{url}") && !template.contains("{encoded}") {
        return Err(ConfigError::InvalidRelayTemplate {
            name: name.to_string(),
        });
    }
    Ok(Relay::Custom {
        name: name.to_string(),
        template: template.to_string(),
    })
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    })?;
    if secs == 0 {
        return Err(ConfigError::ZeroDuration { key });
    }
    Ok(Duration::from_secs(secs))
}
