//! Pool whose workers run tasks as soon as one is free.

use async_trait::async_trait;
use tracing::info;

use super::dispatch::{dispatch, PoolStats};
use super::lifecycle::PoolState;
use super::queue::PoolHandle;
use super::shared::{PoolCore, Worker};
use super::task::BoxedTask;
use super::{Pool, PoolConfig, PoolError};

/// Fixed set of workers draining a bounded queue.
///
/// `RetryLater` outcomes are forwarded to the `retry` handle given at
/// construction (normally a [`super::WaitingPool`]).
#[derive(Debug)]
pub struct ImmediatePool {
    core: PoolCore,
    retry: PoolHandle,
}

impl ImmediatePool {
    /// Create a pool. Fails fast on a misconfigured size; nothing is spawned yet.
    pub fn new(config: PoolConfig, retry: PoolHandle) -> Result<Self, PoolError> {
        Ok(Self {
            core: PoolCore::new(config)?,
            retry,
        })
    }

    /// Producer handle for this pool's queue.
    pub fn handle(&self) -> PoolHandle {
        self.core.handle()
    }

    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// Wait for every worker to exit. Only returns after `stop`.
    pub async fn wait(&self) {
        self.core.wait().await;
    }
}

#[async_trait]
impl Pool for ImmediatePool {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self) {
        let retry = self.retry.clone();
        self.core.start(move |worker| worker_loop(worker, retry.clone()));
    }

    fn stop(&self) {
        self.core.stop();
    }

    async fn add_work(&self, task: BoxedTask) -> Result<(), PoolError> {
        self.core.add_work(task).await
    }

    fn state(&self) -> PoolState {
        self.core.state()
    }
}

async fn worker_loop(worker: Worker, retry: PoolHandle) {
    let Worker {
        pool,
        id,
        receiver,
        shutdown,
        counters,
    } = worker;
    info!(pool = %pool, worker = id, "worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(task) => task,
                None => break,
            },
        };

        dispatch(&pool, id, task, &retry, &counters).await;
    }

    info!(pool = %pool, worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::queue::{task_queue, TaskReceiver};
    use crate::pool::task::{Task, TaskOutcome};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records executions and fails loudly if run by two workers at once.
    struct Recorder {
        id: usize,
        outcome: Result<TaskOutcome, &'static str>,
        running: AtomicBool,
        seen: Arc<Mutex<Vec<usize>>>,
        overlaps: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn boxed(
            id: usize,
            outcome: Result<TaskOutcome, &'static str>,
            seen: &Arc<Mutex<Vec<usize>>>,
            overlaps: &Arc<AtomicUsize>,
            failures: &Arc<AtomicUsize>,
        ) -> BoxedTask {
            Box::new(Self {
                id,
                outcome,
                running: AtomicBool::new(false),
                seen: seen.clone(),
                overlaps: overlaps.clone(),
                failures: failures.clone(),
            })
        }
    }

    #[async_trait]
    impl Task for Recorder {
        async fn execute(&self) -> anyhow::Result<TaskOutcome> {
            if self.running.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.seen.lock().unwrap().push(self.id);
            self.running.store(false, Ordering::SeqCst);
            self.outcome.map_err(|e| anyhow::anyhow!(e))
        }

        async fn on_failure(&self, _error: &anyhow::Error) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(workers: usize, capacity: i64) -> (ImmediatePool, TaskReceiver) {
        let (retry, retry_rx, _) = task_queue("retry", 64);
        let pool = ImmediatePool::new(PoolConfig::new("immediate", workers, capacity), retry).unwrap();
        (pool, retry_rx)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn construction_fails_fast() {
        let (retry, _rx, _) = task_queue("retry", 1);
        assert_eq!(
            ImmediatePool::new(PoolConfig::new("p", 0, 1), retry.clone()).unwrap_err(),
            PoolError::NoWorkers
        );
        assert_eq!(
            ImmediatePool::new(PoolConfig::new("p", 1, -3), retry).unwrap_err(),
            PoolError::NegativeQueueSize(-3)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_task_runs_once_and_never_concurrently() {
        let (pool, _retry_rx) = pool(4, 8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        pool.start();
        for id in 0..50 {
            let task = Recorder::boxed(id, Ok(TaskOutcome::Done), &seen, &overlaps, &failures);
            pool.add_work(task).await.unwrap();
        }

        eventually(|| seen.lock().unwrap().len() == 50).await;
        pool.stop();
        pool.wait().await;

        let ids: HashSet<_> = seen.lock().unwrap().iter().copied().collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().completed, 50);
    }

    #[tokio::test]
    async fn failing_task_calls_on_failure_and_worker_survives() {
        let (pool, _retry_rx) = pool(1, 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        pool.start();
        pool.add_work(Recorder::boxed(1, Err("boom"), &seen, &overlaps, &failures))
            .await
            .unwrap();
        pool.add_work(Recorder::boxed(2, Ok(TaskOutcome::Done), &seen, &overlaps, &failures))
            .await
            .unwrap();

        eventually(|| seen.lock().unwrap().len() == 2).await;
        eventually(|| failures.load(Ordering::SeqCst) == 1).await;

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        pool.stop();
    }

    #[tokio::test]
    async fn retry_later_goes_to_retry_target() {
        let (pool, retry_rx) = pool(1, 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        pool.start();
        pool.add_work(Recorder::boxed(7, Ok(TaskOutcome::RetryLater), &seen, &overlaps, &failures))
            .await
            .unwrap();

        let mut requeued = None;
        for _ in 0..200 {
            requeued = retry_rx.try_recv().await;
            if requeued.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(requeued.is_some());
        assert_eq!(pool.stats().requeued, 1);
        pool.stop();
    }

    struct Panics;

    #[async_trait]
    impl Task for Panics {
        async fn execute(&self) -> anyhow::Result<TaskOutcome> {
            panic!("task bug");
        }

        async fn on_failure(&self, _error: &anyhow::Error) {}
    }

    #[tokio::test]
    async fn panicking_task_does_not_kill_worker() {
        let (pool, _retry_rx) = pool(1, 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        pool.start();
        pool.add_work(Box::new(Panics)).await.unwrap();
        pool.add_work(Recorder::boxed(3, Ok(TaskOutcome::Done), &seen, &overlaps, &failures))
            .await
            .unwrap();

        eventually(|| seen.lock().unwrap().len() == 1).await;
        assert_eq!(pool.stats().panicked, 1);
        pool.stop();
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (pool, _retry_rx) = pool(3, 4);
        assert_eq!(pool.state(), PoolState::Created);

        pool.start();
        pool.start();
        assert_eq!(pool.core.spawned_workers(), 3);
        assert_eq!(pool.state(), PoolState::Running);

        pool.stop();
        pool.stop();
        assert_eq!(pool.state(), PoolState::Stopped);
        tokio::time::timeout(Duration::from_secs(1), pool.wait())
            .await
            .expect("workers exit after stop");
    }

    #[tokio::test]
    async fn add_work_never_blocks_after_stop() {
        let (pool, _retry_rx) = pool(1, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        // Not started: the single slot fills and the next producer waits.
        pool.add_work(Recorder::boxed(1, Ok(TaskOutcome::Done), &seen, &overlaps, &failures))
            .await
            .unwrap();
        let handle = pool.handle();
        let waiting = tokio::spawn({
            let task = Recorder::boxed(2, Ok(TaskOutcome::Done), &seen, &overlaps, &failures);
            async move { handle.add_work(task).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("producer released by stop")
            .unwrap();
        assert!(matches!(result, Err(PoolError::ShutDown(_))));

        let late = Recorder::boxed(3, Ok(TaskOutcome::Done), &seen, &overlaps, &failures);
        assert!(pool.add_work(late).await.is_err());
    }
}
