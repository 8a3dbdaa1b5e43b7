//! Order reconciliation against the accrual system.
//!
//! A [`ReconcileTask`] asks the accrual system about one order per attempt and
//! turns the answer into a [`Verdict`] with [`classify`]:
//!
//! | Answer | Verdict |
//! |---|---|
//! | transport failure, timeout, unexpected HTTP status | retry later, nothing persisted |
//! | `204` (not registered yet) | retry later, nothing persisted |
//! | `REGISTERED` / `PROCESSING` | persist `Processing`, retry later |
//! | `INVALID` | persist `Invalid`, done |
//! | `PROCESSED` | persist `Processed` with the accrual (0 if absent), done |
//! | `500` | fail with [`ReconcileError::OracleInternal`]; `on_failure` persists `Error` |
//!
//! There is no retry cap: an order the accrual system never settles is polled
//! at the waiting pool's cadence for as long as the process runs.

pub mod scheduler;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use rust_decimal::Decimal;

use loyalty_core::OrderStatus;

use crate::accrual::{AccrualError, AccrualReply, AccrualStatus};
use crate::pool::TaskOutcome;
use crate::storage::StoreError;

pub use scheduler::{Reconciler, ReconcilerStats};
pub use task::{ReconcileTask, Timeouts};

/// Errors returned from a reconciliation attempt.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("accrual system returned an internal error")]
    OracleInternal,
    #[error("failed to persist order: {0}")]
    Persist(#[from] StoreError),
    #[error("persisting order timed out after {0:?}")]
    PersistTimeout(Duration),
}

/// What one oracle answer means for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to persist; ask again later.
    RetryLater,
    /// Persist `status` with `accrual`, then continue with `then`.
    Persist {
        status: OrderStatus,
        accrual: Decimal,
        then: TaskOutcome,
    },
    /// The accrual system failed internally.
    OracleInternal,
}

/// Map an oracle answer to a verdict. Pure; no I/O.
pub fn classify(reply: &Result<AccrualReply, AccrualError>) -> Verdict {
    let body = match reply {
        Err(_) | Ok(AccrualReply::NotRegistered) => return Verdict::RetryLater,
        Ok(AccrualReply::InternalError) => return Verdict::OracleInternal,
        Ok(AccrualReply::Status(body)) => body,
    };

    match body.status {
        AccrualStatus::Registered | AccrualStatus::Processing => Verdict::Persist {
            status: OrderStatus::Processing,
            accrual: Decimal::ZERO,
            then: TaskOutcome::RetryLater,
        },
        AccrualStatus::Invalid => Verdict::Persist {
            status: OrderStatus::Invalid,
            accrual: Decimal::ZERO,
            then: TaskOutcome::Done,
        },
        AccrualStatus::Processed => Verdict::Persist {
            status: OrderStatus::Processed,
            accrual: body.accrual.unwrap_or(Decimal::ZERO),
            then: TaskOutcome::Done,
        },
    }
}
