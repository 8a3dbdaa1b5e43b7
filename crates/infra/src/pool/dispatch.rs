//! Running one task attempt and routing its outcome.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use super::queue::PoolHandle;
use super::task::{BoxedTask, TaskOutcome};

/// Pool runtime counters.
#[derive(Debug, Default)]
pub struct PoolCounters {
    dequeued: AtomicU64,
    completed: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub dequeued: u64,
    pub completed: u64,
    pub requeued: u64,
    /// `RetryLater` tasks discarded because the retry pool was shut down.
    pub dropped: u64,
    pub failed: u64,
    pub panicked: u64,
}

impl PoolCounters {
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            dequeued: self.dequeued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Execute one attempt of `task` and route the outcome.
///
/// - `Done`: finished
/// - `RetryLater`: handed to `retry` without blocking the worker, or dropped
///   if `retry` is already shut down
/// - error: `on_failure` runs on the same task before the worker moves on
///
/// The attempt runs on its own tokio task so a panic is contained and only
/// costs that task.
pub(crate) async fn dispatch(
    pool: &str,
    worker: usize,
    task: BoxedTask,
    retry: &PoolHandle,
    counters: &PoolCounters,
) {
    counters.dequeued.fetch_add(1, Ordering::Relaxed);
    debug!(pool, worker, "worker starts to execute task");

    let attempt = tokio::spawn(async move {
        let result = task.execute().await;
        (task, result)
    });

    let (task, result) = match attempt.await {
        Ok(done) => done,
        Err(join_err) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!(pool, worker, error = %join_err, "task panicked; dropping it");
            return;
        }
    };

    match result {
        Ok(TaskOutcome::Done) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(TaskOutcome::RetryLater) => {
            if retry.is_shut_down() {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(pool, worker, retry_pool = retry.pool_name(), "retry pool is shut down; dropping task");
                return;
            }
            counters.requeued.fetch_add(1, Ordering::Relaxed);
            retry.add_work_detached(task);
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(pool, worker, error = %err, "task failed");
            task.on_failure(&err).await;
        }
    }
}
