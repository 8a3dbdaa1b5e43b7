//! Two-tier reconciliation scheduler.
//!
//! Submitted orders go to the immediate pool. Attempts that end in
//! `RetryLater` are moved to the waiting pool, which re-runs them on its tick
//! until the order settles.

use std::sync::Arc;

use tracing::info;

use loyalty_core::OrderNumber;

use super::task::{ReconcileTask, Timeouts};
use crate::accrual::AccrualOracle;
use crate::config::SchedulerConfig;
use crate::pool::{ImmediatePool, Pool, PoolConfig, PoolError, PoolStats, WaitingPool};
use crate::storage::OrderStore;

pub struct Reconciler {
    immediate: ImmediatePool,
    waiting: WaitingPool,
    oracle: Arc<dyn AccrualOracle>,
    store: Arc<dyn OrderStore>,
    timeouts: Timeouts,
}

/// Counters of both pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ReconcilerStats {
    pub immediate: PoolStats,
    pub waiting: PoolStats,
}

impl Reconciler {
    /// Build both pools. Nothing runs until [`Reconciler::start`].
    pub fn new(
        config: &SchedulerConfig,
        oracle: Arc<dyn AccrualOracle>,
        store: Arc<dyn OrderStore>,
    ) -> Result<Self, PoolError> {
        let waiting = WaitingPool::new(
            PoolConfig::new("waiting", config.waiting_workers, config.task_queue_size),
            config.waiting_interval,
        )?;
        let immediate = ImmediatePool::new(
            PoolConfig::new("immediate", config.workers, config.task_queue_size),
            waiting.handle(),
        )?;

        Ok(Self {
            immediate,
            waiting,
            oracle,
            store,
            timeouts: config.timeouts(),
        })
    }

    fn pools(&self) -> [&dyn Pool; 2] {
        [&self.waiting, &self.immediate]
    }

    pub fn start(&self) {
        for pool in self.pools() {
            pool.start();
        }
        info!(
            waiting_interval_ms = self.waiting.period().as_millis() as u64,
            "reconciler started"
        );
    }

    /// Stop accepting work. Attempts already running finish on their own.
    pub fn stop(&self) {
        for pool in self.pools().into_iter().rev() {
            pool.stop();
        }
    }

    /// Wait for every worker of both pools to exit.
    pub async fn wait(&self) {
        self.immediate.wait().await;
        self.waiting.wait().await;
    }

    /// Start reconciling `number`. Waits for room in the immediate queue.
    pub async fn submit(&self, number: OrderNumber) -> Result<(), PoolError> {
        let task = ReconcileTask::new(number, self.oracle.clone(), self.store.clone(), self.timeouts);
        self.immediate.add_work(Box::new(task)).await
    }

    pub fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            immediate: self.immediate.stats(),
            waiting: self.waiting.stats(),
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("immediate", &self.immediate)
            .field("waiting", &self.waiting)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use loyalty_core::{Order, OrderStatus, UserId};
    use rust_decimal::Decimal;

    use crate::accrual::{AccrualError, AccrualReply, AccrualStatus};
    use crate::pool::PoolState;
    use crate::reconcile::testing::{status, ScriptedOracle};
    use crate::storage::InMemoryOrderStore;

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::new(raw).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            workers: 2,
            task_queue_size: 8,
            waiting_workers: 2,
            waiting_interval: Duration::from_secs(1),
            ..SchedulerConfig::default()
        }
    }

    fn reconciler(oracle: &Arc<ScriptedOracle>, store: &Arc<InMemoryOrderStore>) -> Reconciler {
        Reconciler::new(&config(), oracle.clone(), store.clone()).unwrap()
    }

    /// Advance paused time in small steps until `check` holds.
    async fn settle(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("reconciliation did not settle");
    }

    fn statuses(store: &InMemoryOrderStore, wanted: OrderStatus) -> Vec<Order> {
        store.writes().into_iter().filter(|o| o.status == wanted).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn order_settles_after_not_registered_and_processing() {
        let oracle = ScriptedOracle::arc([
            Ok(AccrualReply::NotRegistered),
            status(AccrualStatus::Processing, None),
            status(AccrualStatus::Processed, Some(Decimal::new(50, 1))),
        ]);
        let store = InMemoryOrderStore::arc();
        let user = UserId::new();
        store.register_order(&Order::registered(number("12345"), user)).await.unwrap();

        let reconciler = reconciler(&oracle, &store);
        reconciler.start();
        reconciler.submit(number("12345")).await.unwrap();

        settle(|| !statuses(&store, OrderStatus::Processed).is_empty()).await;
        // Give a stray duplicate attempt the chance to show up.
        tokio::time::sleep(Duration::from_secs(5)).await;

        let stored = store.get_order(&number("12345")).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        assert_eq!(stored.accrual, Decimal::new(50, 1));
        assert_eq!(store.balance(user).await.unwrap().current, Decimal::new(50, 1));
        assert_eq!(oracle.calls(), 3);

        reconciler.stop();
        reconciler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_one_processed_write_after_processing_retries() {
        let oracle = ScriptedOracle::arc([
            status(AccrualStatus::Registered, None),
            status(AccrualStatus::Processing, None),
            status(AccrualStatus::Processing, None),
            status(AccrualStatus::Processed, Some(Decimal::new(1250, 2))),
        ]);
        let store = InMemoryOrderStore::arc();
        let reconciler = reconciler(&oracle, &store);
        reconciler.start();
        reconciler.submit(number("4561261212345467")).await.unwrap();

        settle(|| !statuses(&store, OrderStatus::Processed).is_empty()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let processed = statuses(&store, OrderStatus::Processed);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].accrual, Decimal::new(1250, 2));
        assert_eq!(statuses(&store, OrderStatus::Processing).len(), 3);

        let stats = reconciler.stats();
        assert_eq!(stats.immediate.requeued, 1);
        assert_eq!(stats.waiting.completed, 1);

        reconciler.stop();
        reconciler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn internal_error_marks_order_failed_without_requeue() {
        let oracle = ScriptedOracle::arc([Ok(AccrualReply::InternalError)]);
        let store = InMemoryOrderStore::arc();
        let user = UserId::new();
        store.register_order(&Order::registered(number("99999"), user)).await.unwrap();

        let reconciler = reconciler(&oracle, &store);
        reconciler.start();
        reconciler.submit(number("99999")).await.unwrap();

        settle(|| !statuses(&store, OrderStatus::Error).is_empty()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(statuses(&store, OrderStatus::Error).len(), 1);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(store.balance(user).await.unwrap().current, Decimal::ZERO);
        assert_eq!(reconciler.stats().immediate.failed, 1);
        assert_eq!(reconciler.stats().waiting.dequeued, 0);

        reconciler.stop();
        reconciler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_order_keeps_polling() {
        let oracle = ScriptedOracle::arc([Err(AccrualError::Transport("connection refused".into()))]);
        let store = InMemoryOrderStore::arc();
        let reconciler = reconciler(&oracle, &store);
        reconciler.start();
        reconciler.submit(number("79927398713")).await.unwrap();

        // First attempt runs right away, then one per waiting tick.
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        assert!(oracle.calls() >= 10, "calls: {}", oracle.calls());
        assert!(store.writes().is_empty());
        assert!(reconciler.stats().waiting.requeued >= 9);

        reconciler.stop();
        reconciler.wait().await;
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let oracle = ScriptedOracle::arc([Ok(AccrualReply::NotRegistered)]);
        let store = InMemoryOrderStore::arc();
        let reconciler = reconciler(&oracle, &store);
        reconciler.start();
        reconciler.stop();
        reconciler.stop();

        assert!(matches!(
            reconciler.submit(number("12345")).await,
            Err(PoolError::ShutDown(_))
        ));
        reconciler.wait().await;
        for pool in reconciler.pools() {
            assert_eq!(pool.state(), PoolState::Stopped);
        }
    }

    #[test]
    fn misconfigured_pools_fail_fast() {
        let oracle = ScriptedOracle::arc([Ok(AccrualReply::NotRegistered)]);
        let store = InMemoryOrderStore::arc();
        let cfg = SchedulerConfig {
            task_queue_size: -1,
            ..config()
        };
        assert_eq!(
            Reconciler::new(&cfg, oracle, store).unwrap_err(),
            PoolError::NegativeQueueSize(-1)
        );
    }

    #[test]
    fn zero_waiting_interval_fails_before_any_order_flows() {
        let oracle = ScriptedOracle::arc([
            Ok(AccrualReply::NotRegistered),
            status(AccrualStatus::Invalid, None),
        ]);
        let store = InMemoryOrderStore::arc();
        let cfg = SchedulerConfig {
            waiting_interval: Duration::ZERO,
            ..config()
        };
        assert_eq!(
            Reconciler::new(&cfg, oracle.clone(), store).unwrap_err(),
            PoolError::ZeroInterval
        );
        assert_eq!(oracle.calls(), 0);
    }
}
