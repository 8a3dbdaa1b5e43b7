//! Accrual system ("oracle") access.
//!
//! The accrual system is external and eventually consistent: it may not know
//! an order yet, may still be computing it, or may fail internally.
//! [`AccrualOracle`] is the seam the reconciliation task depends on;
//! [`AccrualClient`] is the HTTP implementation.

pub mod client;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use loyalty_core::OrderNumber;

pub use client::AccrualClient;

/// Order status as reported by the accrual system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

/// Body of a `200 OK` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

/// A decoded answer from the accrual system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualReply {
    /// `204`: the order is not registered there yet.
    NotRegistered,
    /// `200` with a status body.
    Status(AccrualResponse),
    /// `500`: the accrual system failed internally.
    InternalError,
}

/// Failure to obtain an answer at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccrualError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Source of accrual verdicts for one order.
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn order_status(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError>;
}
