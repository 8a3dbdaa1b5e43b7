//! HTTP client for the accrual system.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use loyalty_core::OrderNumber;

use super::{AccrualError, AccrualOracle, AccrualReply, AccrualResponse};

/// First delay between transport retries; doubles on each retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound of a single delay between transport retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

fn next_backoff(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_BACKOFF)
}

/// Total time spent sleeping between `retries` transport retries.
pub fn total_backoff(initial: Duration, retries: u32) -> Duration {
    std::iter::successors(Some(initial.min(MAX_BACKOFF)), |delay| Some(next_backoff(*delay)))
        .take(retries as usize)
        .fold(Duration::ZERO, Duration::saturating_add)
}

/// HTTP accrual client: `GET {base}/api/orders/{number}`.
///
/// Connection-level failures are retried up to `retries` extra times with
/// exponential backoff. HTTP answers (any status) are never retried here; the
/// scheduler decides what to do with them.
#[derive(Debug, Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff: Duration,
}

impl AccrualClient {
    /// `base_url` may omit the scheme (`localhost:8081` means `http://localhost:8081`).
    pub fn new(base_url: &str, retries: u32, timeout: Duration) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccrualError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Initial delay between transport retries (doubles each time, capped at
    /// [`MAX_BACKOFF`]).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff.min(MAX_BACKOFF);
        self
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    async fn interpret(response: reqwest::Response) -> Result<AccrualReply, AccrualError> {
        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<AccrualResponse>()
                    .await
                    .map_err(|e| AccrualError::Decode(e.to_string()))?;
                Ok(AccrualReply::Status(body))
            }
            StatusCode::NO_CONTENT => Ok(AccrualReply::NotRegistered),
            StatusCode::INTERNAL_SERVER_ERROR => Ok(AccrualReply::InternalError),
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}

#[async_trait]
impl AccrualOracle for AccrualClient {
    async fn order_status(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError> {
        let url = self.order_url(number);
        let mut delay = self.backoff;
        let mut attempt = 0u32;

        loop {
            match self.http.get(&url).send().await {
                Ok(response) => {
                    debug!(order = %number, status = response.status().as_u16(), "accrual system answered");
                    return Self::interpret(response).await;
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        order = %number,
                        attempt,
                        error = %err,
                        "request to accrual system failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_backoff(delay);
                }
                Err(err) if err.is_timeout() => return Err(AccrualError::Timeout),
                Err(err) => return Err(AccrualError::Transport(err.to_string())),
            }
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String, AccrualError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AccrualError::Config("accrual address is empty".to_string()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}
