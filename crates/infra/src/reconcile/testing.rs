//! Test doubles for reconciliation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use loyalty_core::{Balance, Order, OrderNumber, UserId};

use crate::accrual::{AccrualError, AccrualOracle, AccrualReply, AccrualResponse, AccrualStatus};
use crate::storage::{OrderStore, StoreError};

pub(crate) fn status(status: AccrualStatus, accrual: Option<Decimal>) -> Result<AccrualReply, AccrualError> {
    Ok(AccrualReply::Status(AccrualResponse {
        order: String::new(),
        status,
        accrual,
    }))
}

/// Answers from a script; the last answer repeats once the script runs out.
pub(crate) struct ScriptedOracle {
    script: Mutex<VecDeque<Result<AccrualReply, AccrualError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<AccrualReply, AccrualError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub(crate) fn arc(script: impl IntoIterator<Item = Result<AccrualReply, AccrualError>>) -> Arc<Self> {
        Arc::new(Self::new(script))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn order_status(&self, _number: &OrderNumber) -> Result<AccrualReply, AccrualError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or(Err(AccrualError::Transport("empty script".into())))
        }
    }
}

/// Store whose every call fails.
pub(crate) struct FailingStore;

#[async_trait]
impl OrderStore for FailingStore {
    async fn register_order(&self, _order: &Order) -> Result<(), StoreError> {
        Err(StoreError::Storage("unavailable".into()))
    }

    async fn set_order(&self, _order: &Order) -> Result<(), StoreError> {
        Err(StoreError::Storage("unavailable".into()))
    }

    async fn get_order(&self, _number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Err(StoreError::Storage("unavailable".into()))
    }

    async fn list_user_orders(&self, _user_id: UserId) -> Result<Vec<Order>, StoreError> {
        Err(StoreError::Storage("unavailable".into()))
    }

    async fn balance(&self, _user_id: UserId) -> Result<Balance, StoreError> {
        Err(StoreError::Storage("unavailable".into()))
    }
}
