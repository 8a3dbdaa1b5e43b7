//! The reconciliation task: one order, one oracle query per attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use loyalty_core::{Order, OrderNumber, OrderStatus};

use super::{classify, ReconcileError, Verdict};
use crate::accrual::{AccrualError, AccrualOracle};
use crate::pool::{Task, TaskOutcome};
use crate::storage::OrderStore;

/// Bounds applied to every oracle call and every persistence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub oracle: Duration,
    pub persist: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            oracle: Duration::from_secs(30),
            persist: Duration::from_secs(3),
        }
    }
}

/// Reconciles one order. Holds nothing between attempts except its
/// collaborators, so running it again is always safe.
pub struct ReconcileTask {
    number: OrderNumber,
    oracle: Arc<dyn AccrualOracle>,
    store: Arc<dyn OrderStore>,
    timeouts: Timeouts,
}

impl ReconcileTask {
    pub fn new(
        number: OrderNumber,
        oracle: Arc<dyn AccrualOracle>,
        store: Arc<dyn OrderStore>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            number,
            oracle,
            store,
            timeouts,
        }
    }

    async fn persist(&self, status: OrderStatus, accrual: Decimal) -> Result<(), ReconcileError> {
        let order = Order::status_update(self.number.clone(), status, accrual);
        match tokio::time::timeout(self.timeouts.persist, self.store.set_order(&order)).await {
            Ok(result) => result.map_err(ReconcileError::from),
            Err(_) => Err(ReconcileError::PersistTimeout(self.timeouts.persist)),
        }
    }
}

impl std::fmt::Debug for ReconcileTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileTask")
            .field("number", &self.number)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for ReconcileTask {
    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let reply = tokio::time::timeout(self.timeouts.oracle, self.oracle.order_status(&self.number))
            .await
            .unwrap_or(Err(AccrualError::Timeout));

        if let Err(err) = &reply {
            warn!(order = %self.number, error = %err, "accrual system unavailable, retrying later");
        }

        match classify(&reply) {
            Verdict::RetryLater => {
                debug!(order = %self.number, "order not settled yet");
                Ok(TaskOutcome::RetryLater)
            }
            Verdict::OracleInternal => Err(ReconcileError::OracleInternal.into()),
            Verdict::Persist {
                status,
                accrual,
                then: TaskOutcome::RetryLater,
            } => {
                // The task is re-queued either way; the next attempt writes again.
                if let Err(err) = self.persist(status, accrual).await {
                    warn!(order = %self.number, %status, error = %err, "failed to persist interim status");
                }
                Ok(TaskOutcome::RetryLater)
            }
            Verdict::Persist {
                status,
                accrual,
                then: TaskOutcome::Done,
            } => {
                self.persist(status, accrual).await?;
                info!(order = %self.number, %status, %accrual, "order reconciled");
                Ok(TaskOutcome::Done)
            }
        }
    }

    async fn on_failure(&self, err: &anyhow::Error) {
        match err.downcast_ref::<ReconcileError>() {
            Some(ReconcileError::OracleInternal) => {
                if let Err(persist_err) = self.persist(OrderStatus::Error, Decimal::ZERO).await {
                    error!(order = %self.number, error = %persist_err, "failed to persist error status");
                } else {
                    info!(order = %self.number, "order marked as failed by the accrual system");
                }
            }
            _ => {
                // A terminal verdict that could not be stored is not retried.
                error!(order = %self.number, error = %err, "reconciliation failed");
            }
        }
    }
}
