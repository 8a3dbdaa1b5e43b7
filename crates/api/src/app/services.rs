use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use loyalty_infra::accrual::{AccrualClient, AccrualOracle};
use loyalty_infra::storage::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use loyalty_infra::{Reconciler, SchedulerConfig};

use crate::config::ApiConfig;

/// Shared state handed to every handler.
pub struct AppServices {
    pub store: Arc<dyn OrderStore>,
    pub reconciler: Reconciler,
}

impl AppServices {
    pub fn new(store: Arc<dyn OrderStore>, reconciler: Reconciler) -> Self {
        Self { store, reconciler }
    }
}

/// Wire the store, the accrual client and the reconciler from configuration.
///
/// The reconciler is built but not started.
pub async fn build_services(api: &ApiConfig, scheduler: &SchedulerConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn OrderStore> = match &api.database_uri {
        Some(uri) => {
            let store = PostgresOrderStore::connect(uri)
                .await
                .context("failed to connect to the database")?;
            store.bootstrap().await.context("failed to create tables")?;
            info!("using postgres order store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URI not set; orders are kept in memory");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    let oracle: Arc<dyn AccrualOracle> = Arc::new(
        AccrualClient::new(
            &scheduler.accrual_address,
            scheduler.accrual_http_retries,
            scheduler.accrual_timeout,
        )
        .context("invalid accrual system address")?,
    );
    info!(accrual = %scheduler.accrual_address, workers = scheduler.workers, "accrual client ready");

    let reconciler = Reconciler::new(scheduler, oracle, store.clone()).context("invalid scheduler sizing")?;
    Ok(AppServices::new(store, reconciler))
}
