use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::application::todo_store::DEFAULT_SEARCH_LIMIT;
use crate::infrastructure::redis_client::RedisSettings;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
#[error("invalid value `{value}` for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Runtime settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: SocketAddr,
    pub search_limit: usize,
    pub redis: RedisSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RedisSettings::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, key)?.map_or(default, Duration::from_secs))
        };

        let health_check_secs: u64 = parse_var(&lookup, "REDIS_HEALTH_CHECK_SECS")?.unwrap_or(1);
        let redis = RedisSettings {
            retry_attempts: parse_var(&lookup, "REDIS_RETRY_ATTEMPTS")?.unwrap_or(defaults.retry_attempts),
            retry_base: secs("REDIS_RETRY_BASE_SECS", defaults.retry_base)?,
            retry_max_delay: secs("REDIS_RETRY_MAX_DELAY_SECS", defaults.retry_max_delay)?,
            response_timeout: secs("REDIS_RESPONSE_TIMEOUT_SECS", defaults.response_timeout)?,
            connection_timeout: secs("REDIS_CONNECT_TIMEOUT_SECS", defaults.connection_timeout)?,
            health_check_interval: (health_check_secs > 0).then(|| Duration::from_secs(health_check_secs)),
        };

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError {
            key: "BIND_ADDR",
            value: bind_addr.clone(),
            reason: e.to_string(),
        })?;

        let search_limit = parse_var(&lookup, "TODOS_SEARCH_LIMIT")?.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if search_limit == 0 {
            return Err(ConfigError { key: "TODOS_SEARCH_LIMIT", value: "0".into(), reason: "must be positive".into() });
        }

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            bind_addr,
            search_limit,
            redis,
        })
    }
}

/// `Ok(None)` when the key is unset, so callers pick their own default.
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError { key, value: raw.clone(), reason: e.to_string() }),
    }
}
