//! State and control shared by both pool kinds.
//!
//! A pool is a [`PoolCore`] plus a worker loop; the core owns the queue,
//! the lifecycle, the counters and the worker join handles.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::dispatch::{PoolCounters, PoolStats};
use super::lifecycle::{Lifecycle, PoolState};
use super::queue::{task_queue, PoolHandle, TaskReceiver};
use super::task::BoxedTask;
use super::{PoolConfig, PoolError};

/// Everything one worker needs from its pool.
pub(crate) struct Worker {
    pub(crate) pool: String,
    pub(crate) id: usize,
    pub(crate) receiver: TaskReceiver,
    pub(crate) shutdown: CancellationToken,
    pub(crate) counters: Arc<PoolCounters>,
}

#[derive(Debug)]
pub(crate) struct PoolCore {
    name: String,
    workers: usize,
    handle: PoolHandle,
    receiver: TaskReceiver,
    shutdown: CancellationToken,
    lifecycle: Lifecycle,
    joins: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

impl PoolCore {
    /// Validate the sizing and allocate the queue. Nothing is spawned yet.
    pub(crate) fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let capacity = config.validate()?;
        let (handle, receiver, shutdown) = task_queue(&config.name, capacity);

        Ok(Self {
            name: config.name,
            workers: config.workers,
            handle,
            receiver,
            shutdown,
            lifecycle: Lifecycle::new(),
            joins: Mutex::new(Vec::new()),
            counters: Arc::new(PoolCounters::default()),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    pub(crate) fn state(&self) -> PoolState {
        self.lifecycle.state()
    }

    pub(crate) async fn add_work(&self, task: BoxedTask) -> Result<(), PoolError> {
        self.handle.add_work(task).await
    }

    /// Spawn `workers` copies of `worker_loop`, once. Must be called inside a
    /// tokio runtime.
    pub(crate) fn start<F, Fut>(&self, worker_loop: F)
    where
        F: Fn(Worker) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.lifecycle.begin_start() {
            return;
        }
        info!(pool = %self.name, workers = self.workers, "starting pool");

        let spawned: Vec<_> = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(Worker {
                    pool: self.name.clone(),
                    id,
                    receiver: self.receiver.clone(),
                    shutdown: self.shutdown.clone(),
                    counters: self.counters.clone(),
                }))
            })
            .collect();
        self.joins().extend(spawned);
    }

    pub(crate) fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        info!(pool = %self.name, "stopping pool");
        self.shutdown.cancel();
    }

    /// Wait for every worker to exit. Only returns after `stop`.
    pub(crate) async fn wait(&self) {
        let joins: Vec<_> = self.joins().drain(..).collect();
        for join in joins {
            if let Err(err) = join.await {
                error!(pool = %self.name, error = %err, "worker exited abnormally");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn spawned_workers(&self) -> usize {
        self.joins().len()
    }

    fn joins(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.joins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
