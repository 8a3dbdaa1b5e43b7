//! Scheduler configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `ACCRUAL_SYSTEM_ADDRESS` | `http://localhost:8081` |
//! | `WORKERS` | `3` |
//! | `TASK_QUEUE_SIZE` | `2 * WORKERS` |
//! | `WAITING_WORKERS` | `WORKERS` |
//! | `WAITING_INTERVAL_MS` | `3000` |
//! | `ACCRUAL_HTTP_RETRIES` | `3` (at most 10) |
//! | `ACCRUAL_TIMEOUT_MS` | `5000` |
//! | `PERSIST_TIMEOUT_MS` | `3000` |

use std::str::FromStr;
use std::time::Duration;

use crate::accrual::client::{total_backoff, DEFAULT_BACKOFF};
use crate::reconcile::Timeouts;

/// A variable is present but unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} must be at least 1")]
    Zero { key: &'static str },
    #[error("{key} must be at most {max}")]
    TooLarge { key: &'static str, max: u64 },
}

/// Upper bound for `ACCRUAL_HTTP_RETRIES`.
pub const MAX_HTTP_RETRIES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub accrual_address: String,
    pub workers: usize,
    pub task_queue_size: i64,
    pub waiting_workers: usize,
    pub waiting_interval: Duration,
    pub accrual_http_retries: u32,
    pub accrual_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            accrual_address: "http://localhost:8081".to_string(),
            workers: 3,
            task_queue_size: 6,
            waiting_workers: 3,
            waiting_interval: Duration::from_millis(3000),
            accrual_http_retries: 3,
            accrual_timeout: Duration::from_millis(5000),
            persist_timeout: Duration::from_millis(3000),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workers = parse_or(get("WORKERS"), "WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ConfigError::Zero { key: "WORKERS" });
        }
        let waiting_workers = parse_or(get("WAITING_WORKERS"), "WAITING_WORKERS", workers)?;
        if waiting_workers == 0 {
            return Err(ConfigError::Zero { key: "WAITING_WORKERS" });
        }

        let waiting_interval = millis_or(get("WAITING_INTERVAL_MS"), "WAITING_INTERVAL_MS", defaults.waiting_interval)?;
        if waiting_interval.is_zero() {
            return Err(ConfigError::Zero { key: "WAITING_INTERVAL_MS" });
        }
        let accrual_http_retries = parse_or(
            get("ACCRUAL_HTTP_RETRIES"),
            "ACCRUAL_HTTP_RETRIES",
            defaults.accrual_http_retries,
        )?;
        if accrual_http_retries > MAX_HTTP_RETRIES {
            return Err(ConfigError::TooLarge {
                key: "ACCRUAL_HTTP_RETRIES",
                max: MAX_HTTP_RETRIES.into(),
            });
        }

        Ok(Self {
            accrual_address: get("ACCRUAL_SYSTEM_ADDRESS").unwrap_or(defaults.accrual_address),
            workers,
            task_queue_size: parse_or(get("TASK_QUEUE_SIZE"), "TASK_QUEUE_SIZE", workers as i64 * 2)?,
            waiting_workers,
            waiting_interval,
            accrual_http_retries,
            accrual_timeout: millis_or(get("ACCRUAL_TIMEOUT_MS"), "ACCRUAL_TIMEOUT_MS", defaults.accrual_timeout)?,
            persist_timeout: millis_or(get("PERSIST_TIMEOUT_MS"), "PERSIST_TIMEOUT_MS", defaults.persist_timeout)?,
        })
    }

    /// Per-attempt bounds for the reconciliation task.
    ///
    /// The oracle bound covers every transport retry of the HTTP client,
    /// backoff included.
    pub fn timeouts(&self) -> Timeouts {
        let attempts = self.accrual_http_retries.saturating_add(1);
        let backoff = total_backoff(DEFAULT_BACKOFF, self.accrual_http_retries);
        Timeouts {
            oracle: self.accrual_timeout.saturating_mul(attempts).saturating_add(backoff),
            persist: self.persist_timeout,
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

fn millis_or(raw: Option<String>, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(raw, key, default.as_millis() as u64).map(Duration::from_millis)
}
