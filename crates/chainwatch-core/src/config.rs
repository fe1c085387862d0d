//! Process configuration, read from the environment at startup.
//!
//! A missing endpoint or token is fatal: the binary refuses to start.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::CommitmentLevel;
use crate::policy::RetryConfig;
use crate::subscribe::SubscribeRequest;

pub const ENV_ENDPOINT: &str = "RPC_URL_PATH";
pub const ENV_TOKEN: &str = "RPC_TOKEN";
pub const ENV_RECONNECT_SECS: &str = "CHAINWATCH_RECONNECT_SECS";
pub const ENV_POLL_SECS: &str = "CHAINWATCH_POLL_SECS";
pub const ENV_COMMITMENT: &str = "CHAINWATCH_COMMITMENT";
pub const ENV_ACCOUNT_INCLUDE: &str = "CHAINWATCH_ACCOUNT_INCLUDE";
pub const ENV_ACCOUNT_EXCLUDE: &str = "CHAINWATCH_ACCOUNT_EXCLUDE";
pub const ENV_ACCOUNT_REQUIRED: &str = "CHAINWATCH_ACCOUNT_REQUIRED";
pub const ENV_MAX_MESSAGE_BYTES: &str = "CHAINWATCH_MAX_MESSAGE_BYTES";
pub const ENV_LOG: &str = "CHAINWATCH_LOG";
pub const ENV_LOG_JSON: &str = "CHAINWATCH_LOG_JSON";

/// Largest inbound stream message accepted (64 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Startup-fatal configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {0} in environment variables")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Account lists for the transaction filter. All empty = match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, e.g. `"info"` or `"info,chainwatch_core=debug"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON structured logs (true) or human-readable text (false).
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Everything the binary needs to wire up the watcher and the monitor.
#[derive(Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Node endpoint, e.g. `"https://example.rpcpool.com/"`.
    pub endpoint: String,
    /// Access token; sent as a header on the stream, appended to the RPC URL.
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(default)]
    pub commitment: CommitmentLevel,
    #[serde(default = "default_interval_secs")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub accounts: AccountFilter,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

impl std::fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("commitment", &self.commitment)
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("accounts", &self.accounts)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("log", &self.log)
            .finish()
    }
}

impl WatchConfig {
    /// Minimal config with defaults for everything but endpoint and token.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            commitment: CommitmentLevel::default(),
            reconnect_interval_secs: default_interval_secs(),
            poll_interval_secs: default_interval_secs(),
            accounts: AccountFilter::default(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            log: LogConfig::default(),
        }
    }

    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = get(ENV_ENDPOINT).ok_or(ConfigError::Missing(ENV_ENDPOINT))?;
        let token = get(ENV_TOKEN).ok_or(ConfigError::Missing(ENV_TOKEN))?;
        let mut config = Self::new(endpoint.trim(), token.trim());

        if let Some(raw) = get(ENV_RECONNECT_SECS) {
            config.reconnect_interval_secs = parse_positive(ENV_RECONNECT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_POLL_SECS) {
            config.poll_interval_secs = parse_positive(ENV_POLL_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_COMMITMENT) {
            config.commitment = raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { key: ENV_COMMITMENT, reason })?;
        }
        if let Some(raw) = get(ENV_MAX_MESSAGE_BYTES) {
            config.max_message_bytes = parse_positive(ENV_MAX_MESSAGE_BYTES, &raw)?;
        }

        config.accounts = AccountFilter {
            include: get(ENV_ACCOUNT_INCLUDE).map(|v| split_list(&v)).unwrap_or_default(),
            exclude: get(ENV_ACCOUNT_EXCLUDE).map(|v| split_list(&v)).unwrap_or_default(),
            required: get(ENV_ACCOUNT_REQUIRED).map(|v| split_list(&v)).unwrap_or_default(),
        };

        if let Some(level) = get(ENV_LOG) {
            config.log.level = level;
        }
        if let Some(raw) = get(ENV_LOG_JSON) {
            config.log.json = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// JSON-RPC URL: the endpoint with the token appended.
    pub fn rpc_url(&self) -> String {
        format!("{}{}", self.endpoint, self.token)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Fixed-interval reconnect policy, retrying forever.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.reconnect_interval())
    }

    /// Request sent on every (re)subscribe.
    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest::slots_and_transactions(self.commitment, &self.accounts)
    }
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
