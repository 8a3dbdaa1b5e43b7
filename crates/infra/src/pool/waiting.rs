//! Pool for tasks that are not ready yet.
//!
//! Each worker sleeps on its own fixed-interval ticker and, per tick, makes a
//! single non-blocking dequeue attempt. With `W` workers and period `P`, at
//! most `W` tasks start per `P`, however long the queue is. This is what
//! keeps retries from hammering the accrual system.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use super::dispatch::{dispatch, PoolStats};
use super::lifecycle::PoolState;
use super::queue::PoolHandle;
use super::shared::{PoolCore, Worker};
use super::task::BoxedTask;
use super::{Pool, PoolConfig, PoolError};

/// Tick-gated pool. `RetryLater` outcomes go back into this same pool.
#[derive(Debug)]
pub struct WaitingPool {
    core: PoolCore,
    period: Duration,
}

impl WaitingPool {
    /// Create a pool polling every `period`. Fails fast on a misconfigured
    /// size or a zero period.
    pub fn new(config: PoolConfig, period: Duration) -> Result<Self, PoolError> {
        if period.is_zero() {
            return Err(PoolError::ZeroInterval);
        }
        Ok(Self {
            core: PoolCore::new(config)?,
            period,
        })
    }

    /// Producer handle for this pool's queue.
    pub fn handle(&self) -> PoolHandle {
        self.core.handle()
    }

    pub fn period(&self) -> Duration {
        self.period
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
impl Pool for WaitingPool {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self) {
        let period = self.period;
        let retry = self.core.handle();
        self.core.start(move |worker| worker_loop(worker, period, retry.clone()));
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

async fn worker_loop(worker: Worker, period: Duration, retry: PoolHandle) {
    let Worker {
        pool,
        id,
        receiver,
        shutdown,
        counters,
    } = worker;
    info!(pool = %pool, worker = id, period_ms = period.as_millis() as u64, "worker started");

    // First tick one full period from now; a missed tick is not made up for.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(task) = receiver.try_recv().await else {
                    continue;
                };
                dispatch(&pool, id, task, &retry, &counters).await;
            }
        }
    }

    info!(pool = %pool, worker = id, "worker stopped");
}
