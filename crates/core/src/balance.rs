//! User balance (derived from processed orders).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Loyalty balance of a single user.
///
/// `current` is what the user can spend; `withdrawn` is the running total
/// of everything already spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            current: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }

    pub fn credit(&mut self, amount: Decimal) {
        self.current += amount;
    }
}
