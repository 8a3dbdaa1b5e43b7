//! Infrastructure layer: task pools, accrual client, storage, reconciliation, config.

pub mod accrual;
pub mod config;
pub mod pool;
pub mod reconcile;
pub mod storage;

pub use config::{ConfigError, SchedulerConfig};
pub use reconcile::Reconciler;
