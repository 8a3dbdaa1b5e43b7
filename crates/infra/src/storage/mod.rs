//! Order and balance persistence.
//!
//! ## Contract relied on by reconciliation
//!
//! `set_order` is an upsert keyed by order number:
//!
//! - on conflict it overwrites status, action and accrual and stamps `processed_at`
//! - status may only move forward (see `OrderStatus::can_transition_to`)
//! - when the stored status *becomes* `Processed` for an `Add` order, the
//!   owner's balance is credited by the accrual in the same write
//!
//! Writing the same terminal status again is accepted and never credits twice,
//! so replayed verdicts are harmless. Implementations must be safe under
//! concurrent use; they are the only guard of the balance invariant.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use loyalty_core::{Balance, Order, OrderNumber, OrderStatus, UserId};

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

/// Storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} was already uploaded by this user")]
    AlreadyUploaded(OrderNumber),
    #[error("order {0} belongs to another user")]
    OwnedByAnotherUser(OrderNumber),
    #[error("order {number}: status cannot move from {from} to {to}")]
    InvalidTransition {
        number: OrderNumber,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence used by the intake API and the reconciliation scheduler.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a freshly uploaded order.
    ///
    /// Fails with `AlreadyUploaded` / `OwnedByAnotherUser` when the number is
    /// already known.
    async fn register_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Upsert an order status (see module docs).
    async fn set_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    /// Orders of one user, oldest upload first.
    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Current balance; an unknown user has an empty balance.
    async fn balance(&self, user_id: UserId) -> Result<Balance, StoreError>;
}

/// Check an upsert against the currently stored status.
pub(crate) fn check_transition(
    number: &OrderNumber,
    current: Option<OrderStatus>,
    next: OrderStatus,
) -> Result<(), StoreError> {
    match current {
        Some(from) if !from.can_transition_to(next) => Err(StoreError::InvalidTransition {
            number: number.clone(),
            from,
            to: next,
        }),
        _ => Ok(()),
    }
}

/// Check a registration against an existing order with the same number.
pub(crate) fn check_registration(
    number: &OrderNumber,
    existing_owner: Option<UserId>,
    uploader: Option<UserId>,
) -> StoreError {
    if existing_owner.is_some() && existing_owner == uploader {
        StoreError::AlreadyUploaded(number.clone())
    } else {
        StoreError::OwnedByAnotherUser(number.clone())
    }
}
