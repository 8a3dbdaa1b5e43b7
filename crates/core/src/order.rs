//! Order model and its status state machine.
//!
//! Statuses only move forward:
//!
//! ```text
//! Registered -> Processing -> Processed
//!          \          \----> Invalid
//!           \---------------> Error   (from any non-terminal status)
//! ```
//!
//! `Processed`, `Invalid` and `Error` are terminal. Re-applying the *same*
//! status is always allowed so that replayed persistence stays idempotent.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{OrderNumber, UserId};

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Invalid | OrderStatus::Processed | OrderStatus::Error
        )
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Registered => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Invalid | OrderStatus::Processed | OrderStatus::Error => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REGISTERED" | "NEW" => Ok(OrderStatus::Registered),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "ERROR" => Ok(OrderStatus::Error),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// What an order does to the owner's balance once processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Add,
    Withdraw,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Add => "add",
            OrderAction::Withdraw => "withdraw",
        }
    }
}

impl FromStr for OrderAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(OrderAction::Add),
            "withdraw" => Ok(OrderAction::Withdraw),
            other => Err(DomainError::validation(format!("unknown order action: {other}"))),
        }
    }
}

/// A loyalty order.
///
/// `user_id` is `None` on updates produced by the reconciliation scheduler,
/// which only knows the order number; storage keeps the owner it already has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub action: OrderAction,
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A freshly uploaded order awaiting reconciliation.
    pub fn registered(number: OrderNumber, user_id: UserId) -> Self {
        Self {
            number,
            user_id: Some(user_id),
            status: OrderStatus::Registered,
            action: OrderAction::Add,
            accrual: Decimal::ZERO,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }

    /// A status update for an existing order, as produced by reconciliation.
    pub fn status_update(number: OrderNumber, status: OrderStatus, accrual: Decimal) -> Self {
        Self {
            number,
            user_id: None,
            status,
            action: OrderAction::Add,
            accrual,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }

    /// True when persisting this order must credit the owner's balance.
    pub fn credits_balance(&self) -> bool {
        self.status == OrderStatus::Processed && self.action == OrderAction::Add
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Registered,
        OrderStatus::Processing,
        OrderStatus::Invalid,
        OrderStatus::Processed,
        OrderStatus::Error,
    ];

    #[test]
    fn forward_transitions_are_allowed() {
        use OrderStatus::*;
        assert!(Registered.can_transition_to(Processing));
        assert!(Registered.can_transition_to(Processed));
        assert!(Registered.can_transition_to(Error));
        assert!(Processing.can_transition_to(Invalid));
        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Processing));
    }

    #[test]
    fn terminal_statuses_do_not_move() {
        use OrderStatus::*;
        for terminal in [Invalid, Processed, Error] {
            for next in ALL {
                assert_eq!(terminal.can_transition_to(next), next == terminal);
            }
        }
        assert!(!Processing.can_transition_to(Registered));
    }

    #[test]
    fn status_wire_names_round_trip() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("new".parse::<OrderStatus>().unwrap(), OrderStatus::Registered);
        assert!("DONE".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_processed_additions_credit_balance() {
        let number = OrderNumber::new("12345").unwrap();
        let mut order = Order::status_update(number, OrderStatus::Processed, Decimal::new(500, 2));
        assert!(order.credits_balance());

        order.action = OrderAction::Withdraw;
        assert!(!order.credits_balance());

        order.action = OrderAction::Add;
        order.status = OrderStatus::Processing;
        assert!(!order.credits_balance());
    }

    proptest! {
        /// Property: any accepted path of transitions never leaves a terminal status.
        #[test]
        fn accepted_paths_are_monotonic(path in prop::collection::vec(0usize..5, 1..12)) {
            let mut current = OrderStatus::Registered;
            for idx in path {
                let next = ALL[idx];
                if current.can_transition_to(next) {
                    if current.is_terminal() {
                        prop_assert_eq!(next, current);
                    }
                    current = next;
                }
            }
        }
    }
}
