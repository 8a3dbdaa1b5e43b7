//! In-memory order store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use loyalty_core::{Balance, Order, OrderNumber, OrderStatus, UserId};

use super::{check_registration, check_transition, OrderStore, StoreError};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderNumber, Order>,
    balances: HashMap<UserId, Balance>,
    writes: Vec<Order>,
}

/// In-memory store. One mutex covers orders and balances, so the
/// status upsert and the balance credit are a single atomic step.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every order passed to `set_order` that was accepted, in call order.
    pub fn writes(&self) -> Vec<Order> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn register_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.orders.get_mut(&order.number) {
            // Known to the scheduler but never claimed: adopt it.
            Some(existing) if existing.user_id.is_none() => {
                existing.user_id = order.user_id;
                Ok(())
            }
            Some(existing) => Err(check_registration(
                &order.number,
                existing.user_id,
                order.user_id,
            )),
            None => {
                state.orders.insert(order.number.clone(), order.clone());
                Ok(())
            }
        }
    }

    async fn set_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let previous = state.orders.get(&order.number).map(|o| o.status);
        check_transition(&order.number, previous, order.status)?;

        let now = Utc::now();
        let owner = match state.orders.get_mut(&order.number) {
            Some(existing) => {
                existing.status = order.status;
                existing.action = order.action;
                existing.accrual = order.accrual;
                existing.processed_at = Some(now);
                existing.user_id
            }
            None => {
                state.orders.insert(order.number.clone(), order.clone());
                order.user_id
            }
        };

        if order.credits_balance() && previous != Some(OrderStatus::Processed) {
            if let Some(user_id) = owner {
                state
                    .balances
                    .entry(user_id)
                    .or_insert_with(|| Balance::empty(user_id))
                    .credit(order.accrual);
            }
        }

        state.writes.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.get(number).cloned())
    }

    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.lock();
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.uploaded_at);
        Ok(orders)
    }

    async fn balance(&self, user_id: UserId) -> Result<Balance, StoreError> {
        Ok(self
            .lock()
            .balances
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Balance::empty(user_id)))
    }
}
