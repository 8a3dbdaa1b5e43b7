//! Task pools for background work.
//!
//! ## Design
//!
//! - Two pool kinds share one task contract ([`Task`]):
//!   - [`ImmediatePool`]: workers drain the queue as fast as they can
//!   - [`WaitingPool`]: workers wake on a fixed tick and try exactly one
//!     non-blocking dequeue each, which caps the retry rate
//! - Tasks report `Done` or `RetryLater`; the pool (not the task) moves
//!   `RetryLater` tasks to the pool's retry target
//! - Errors go to [`Task::on_failure`]; a failing or panicking task never
//!   takes its worker down
//! - Queues are bounded and in-memory only
//!
//! ## Lifecycle
//!
//! `Created -> Running -> Stopped`. `start` and `stop` are idempotent and safe
//! under concurrent callers. Tasks already executing when `stop` is called
//! run to completion.

pub mod dispatch;
pub mod immediate;
pub mod lifecycle;
pub mod queue;
mod shared;
pub mod task;
pub mod waiting;

use async_trait::async_trait;

pub use dispatch::PoolStats;
pub use immediate::ImmediatePool;
pub use lifecycle::PoolState;
pub use queue::PoolHandle;
pub use task::{BoxedTask, Task, TaskOutcome};
pub use waiting::WaitingPool;

/// Pool construction and submission error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("attempting to create a pool with less than 1 worker")]
    NoWorkers,
    #[error("attempting to create a pool with a negative queue size: {0}")]
    NegativeQueueSize(i64),
    #[error("attempting to create a waiting pool with a zero tick interval")]
    ZeroInterval,
    #[error("pool {0} is shut down")]
    ShutDown(String),
}

/// Sizing for a pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name for logging
    pub name: String,
    /// Number of worker routines (must be >= 1)
    pub workers: usize,
    /// Queue capacity (must be >= 0)
    pub queue_capacity: i64,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, workers: usize, queue_capacity: i64) -> Self {
        Self {
            name: name.into(),
            workers,
            queue_capacity,
        }
    }

    /// Validate the sizing and return the channel capacity to allocate.
    ///
    /// A capacity of 0 is accepted; tokio channels need at least one slot, so
    /// it is backed by a single-slot queue.
    pub(crate) fn validate(&self) -> Result<usize, PoolError> {
        if self.workers < 1 {
            return Err(PoolError::NoWorkers);
        }
        if self.queue_capacity < 0 {
            return Err(PoolError::NegativeQueueSize(self.queue_capacity));
        }
        Ok((self.queue_capacity as usize).max(1))
    }
}

/// Common control surface of both pool kinds.
#[async_trait]
pub trait Pool: Send + Sync {
    fn name(&self) -> &str;

    /// Spawn the workers. No-op after the first call.
    fn start(&self);

    /// Signal shutdown. No-op after the first call.
    fn stop(&self);

    /// Enqueue a task; waits for queue capacity or shutdown, whichever comes first.
    async fn add_work(&self, task: BoxedTask) -> Result<(), PoolError>;

    fn state(&self) -> PoolState;
}
