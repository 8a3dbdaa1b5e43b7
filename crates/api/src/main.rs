use std::sync::Arc;

use anyhow::Context;

use loyalty_api::app::{build_app, services};
use loyalty_api::config::ApiConfig;
use loyalty_infra::SchedulerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api_config = ApiConfig::from_env();
    match &api_config {
        Ok(cfg) => loyalty_observability::init_with_default(&cfg.log_level),
        Err(_) => loyalty_observability::init(),
    }
    let api_config = api_config?;
    let scheduler_config = SchedulerConfig::from_env()?;

    let services = Arc::new(services::build_services(&api_config, &scheduler_config).await?);
    services.reconciler.start();

    let app = build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(api_config.run_address)
        .await
        .with_context(|| format!("failed to bind {}", api_config.run_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http server stopped; draining reconciler");
    services.reconciler.stop();
    services.reconciler.wait().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
