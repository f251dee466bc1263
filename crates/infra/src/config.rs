//! Engine configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use settle_core::BranchId;
use settle_observability::LogFormat;

use crate::jobs::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,

    pub log_format: LogFormat,

    /// Attempts per collaborator job before dead-lettering
    pub job_max_attempts: u32,

    /// First retry delay (doubles per attempt)
    pub job_base_delay: Duration,

    /// Retry delay cap
    pub job_max_delay: Duration,

    /// Background job worker idle sleep
    pub job_poll_interval: Duration,

    /// Prefix of generated order numbers (`ORD-20250301-00001`)
    pub order_number_prefix: String,

    /// Branch used for stock movements when a cart names none
    pub default_branch: Option<BranchId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
            job_max_attempts: 5,
            job_base_delay: Duration::from_millis(500),
            job_max_delay: Duration::from_millis(60_000),
            job_poll_interval: Duration::from_millis(250),
            order_number_prefix: "ORD".to_string(),
            default_branch: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = EngineConfig {
            http_addr: parse_or(&get, "SETTLE_HTTP_ADDR", defaults.http_addr)?,

            log_format: parse_or(&get, "SETTLE_LOG_FORMAT", defaults.log_format)?,

            job_max_attempts: parse_or(&get, "SETTLE_JOB_MAX_ATTEMPTS", defaults.job_max_attempts)?,

            job_base_delay: millis_or(&get, "SETTLE_JOB_BASE_DELAY_MS", defaults.job_base_delay)?,

            job_max_delay: millis_or(&get, "SETTLE_JOB_MAX_DELAY_MS", defaults.job_max_delay)?,

            job_poll_interval: millis_or(
                &get,
                "SETTLE_JOB_POLL_INTERVAL_MS",
                defaults.job_poll_interval,
            )?,

            order_number_prefix: get("SETTLE_ORDER_NUMBER_PREFIX")
                .unwrap_or(defaults.order_number_prefix),

            default_branch: get("SETTLE_DEFAULT_BRANCH")
                .map(|v| {
                    v.parse::<BranchId>()
                        .map_err(|e| ConfigError::invalid("SETTLE_DEFAULT_BRANCH", e))
                })
                .transpose()?,
        };

        if config.job_max_attempts == 0 {
            return Err(ConfigError::invalid(
                "SETTLE_JOB_MAX_ATTEMPTS",
                "must be at least 1",
            ));
        }
        if config.job_max_delay < config.job_base_delay {
            return Err(ConfigError::invalid(
                "SETTLE_JOB_MAX_DELAY_MS",
                "must not be below SETTLE_JOB_BASE_DELAY_MS",
            ));
        }
        if !config
            .order_number_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::invalid(
                "SETTLE_ORDER_NUMBER_PREFIX",
                "only ASCII letters and digits are allowed",
            ));
        }

        Ok(config)
    }

    /// Retry policy applied to every collaborator job.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.job_max_attempts, self.job_base_delay, self.job_max_delay)
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(key, e)),
        None => Ok(default),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(get, key, default.as_millis() as u64).map(Duration::from_millis)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl std::fmt::Display) -> Self {
        ConfigError::InvalidValue {
            key,
            message: message.to_string(),
        }
    }
}
