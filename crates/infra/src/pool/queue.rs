//! Bounded task queue shared by a pool's workers and its producers.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::BoxedTask;
use super::PoolError;

/// Consumer side of a pool's queue.
///
/// tokio's `mpsc` is single-consumer, so workers take turns on the receiver.
#[derive(Debug, Clone)]
pub(crate) struct TaskReceiver {
    rx: Arc<Mutex<mpsc::Receiver<BoxedTask>>>,
}

impl TaskReceiver {
    /// Wait for the next task. `None` once every producer is gone.
    pub(crate) async fn recv(&self) -> Option<BoxedTask> {
        self.rx.lock().await.recv().await
    }

    /// Take a task only if one is queued right now.
    pub(crate) async fn try_recv(&self) -> Option<BoxedTask> {
        self.rx.lock().await.try_recv().ok()
    }
}

/// Producer side of a pool's queue.
///
/// Cheap to clone. Handles are how one pool hands retries to another
/// without knowing its concrete type.
#[derive(Clone)]
pub struct PoolHandle {
    pool: Arc<str>,
    tx: mpsc::Sender<BoxedTask>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool", &self.pool)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl PoolHandle {
    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    /// Enqueue a task.
    ///
    /// Suspends only while the queue is full, and returns as soon as the pool
    /// is shut down, so a stopped pool never blocks a caller forever.
    pub async fn add_work(&self, task: BoxedTask) -> Result<(), PoolError> {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown(self.pool.to_string()));
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(PoolError::ShutDown(self.pool.to_string())),
            sent = self.tx.send(task) => sent.map_err(|_| PoolError::ShutDown(self.pool.to_string())),
        }
    }

    /// Enqueue from a detached tokio task; the caller never waits.
    ///
    /// Workers use this to requeue, so a worker can't block on a full queue
    /// it is itself responsible for draining.
    pub fn add_work_detached(&self, task: BoxedTask) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.add_work(task).await {
                debug!(pool = %handle.pool, error = %err, "dropped task on shutdown");
            }
        });
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Create a bounded queue and its shutdown signal.
pub(crate) fn task_queue(
    pool: &str,
    capacity: usize,
) -> (PoolHandle, TaskReceiver, CancellationToken) {
    let (tx, rx) = mpsc::channel(capacity);
    let shutdown = CancellationToken::new();

    let handle = PoolHandle {
        pool: Arc::from(pool),
        tx,
        shutdown: shutdown.clone(),
    };
    let receiver = TaskReceiver {
        rx: Arc::new(Mutex::new(rx)),
    };

    (handle, receiver, shutdown)
}
