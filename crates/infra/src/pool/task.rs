//! Unit-of-work contract shared by every pool.

use async_trait::async_trait;

/// How a successful execution wants to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Nothing left to do.
    Done,
    /// Not decided yet; run again later from the pool's retry target.
    RetryLater,
}

/// A unit of background work.
///
/// Pools only ever see this trait, never a concrete task type. A task value is
/// owned by exactly one worker at a time; retries move it between queues.
///
/// Errors are `anyhow::Error` so any task kind can report its own error
/// type; `on_failure` may downcast to recover it.
#[async_trait]
pub trait Task: Send + Sync {
    /// Run one attempt.
    async fn execute(&self) -> anyhow::Result<TaskOutcome>;

    /// Called by the worker after `execute` returned an error.
    async fn on_failure(&self, error: &anyhow::Error);
}

pub type BoxedTask = Box<dyn Task>;
