//! Runtime configuration, read from environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::fetcher::RetryPolicy;
use crate::logging::{LogFormat, LoggingConfig};

pub const DEFAULT_UPSTREAM_URL: &str = "https://csrng.net/csrng/csrng.php?min=0&max=100";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// How samples are obtained from the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Background loop keeps the average fresh; reads never touch the network.
    Poll,
    /// Each read triggers (or joins) a coalesced fetch cycle.
    OnDemand,
}

/// Which HTTP client talks to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Async,
    Blocking,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub upstream_url: String,
    pub mode: FetchMode,
    pub transport: Transport,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub retry_budget: Duration,
    pub max_pending: usize,
    pub upstream_timeout: Duration,
    /// Keep the poll loop from starting on its own (tests drive ticks by hand).
    pub loop_stopped: bool,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
            mode: FetchMode::Poll,
            transport: Transport::Async,
            poll_interval: Duration::from_millis(1000),
            retry_interval: Duration::from_millis(200),
            retry_budget: Duration::from_millis(1000),
            max_pending: 1024,
            upstream_timeout: Duration::from_millis(5000),
            loop_stopped: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Read the process environment (after loading `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|&k| lookup(k))
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            port: parse(get(&["PORT"]), "PORT", defaults.port)?,
            upstream_url: get(&["CSRNG_URL"]).unwrap_or(defaults.upstream_url),
            mode: match get(&["FETCH_MODE"]).as_deref() {
                None | Some("poll") => FetchMode::Poll,
                Some("on-demand") | Some("on_demand") => FetchMode::OnDemand,
                Some(other) => return Err(invalid("FETCH_MODE", other)),
            },
            transport: match get(&["UPSTREAM_TRANSPORT"]).as_deref() {
                None | Some("async") => Transport::Async,
                Some("blocking") => Transport::Blocking,
                Some(other) => return Err(invalid("UPSTREAM_TRANSPORT", other)),
            },
            poll_interval: millis(
                get(&["POLL_INTERVAL_MS", "DEBUG_POLL_INTERVAL"]),
                "POLL_INTERVAL_MS",
                defaults.poll_interval,
            )?,
            retry_interval: millis(
                get(&["RETRY_INTERVAL_MS"]),
                "RETRY_INTERVAL_MS",
                defaults.retry_interval,
            )?,
            retry_budget: millis(
                get(&["RETRY_BUDGET_MS"]),
                "RETRY_BUDGET_MS",
                defaults.retry_budget,
            )?,
            max_pending: parse(get(&["MAX_PENDING"]), "MAX_PENDING", defaults.max_pending)?,
            upstream_timeout: millis(
                get(&["UPSTREAM_TIMEOUT_MS"]),
                "UPSTREAM_TIMEOUT_MS",
                defaults.upstream_timeout,
            )?,
            loop_stopped: get(&["LOOP_STOPPED", "DEBUG_LOOP_STOPPED"]).is_some(),
            logging: LoggingConfig {
                level: get(&["LOG_LEVEL"]).unwrap_or(defaults.logging.level),
                format: match get(&["LOG_FORMAT"]).as_deref() {
                    None | Some("pretty") => LogFormat::Pretty,
                    Some("json") => LogFormat::Json,
                    Some(other) => return Err(invalid("LOG_FORMAT", other)),
                },
            },
        };

        config.check()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: self.retry_interval,
            budget: self.retry_budget,
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.retry_interval.is_zero() {
            return Err(invalid("RETRY_INTERVAL_MS", "0"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("POLL_INTERVAL_MS", "0"));
        }
        if self.max_pending == 0 {
            return Err(invalid("MAX_PENDING", "0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: format!("unsupported value '{value}'"),
    }
}

fn parse<T>(raw: Option<String>, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field,
            reason: format!("'{v}': {e}"),
        }),
    }
}

fn millis(
    raw: Option<String>,
    field: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = default.as_millis() as u64;
    parse(raw, field, default_ms).map(Duration::from_millis)
}
