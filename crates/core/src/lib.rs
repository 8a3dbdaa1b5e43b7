//! `loyalty-core`: domain building blocks for the loyalty order backend.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod balance;
pub mod error;
pub mod id;
pub mod order;

pub use balance::Balance;
pub use error::DomainError;
pub use id::{OrderNumber, UserId};
pub use order::{Order, OrderAction, OrderStatus};
