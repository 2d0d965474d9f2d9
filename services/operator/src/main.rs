//! keel operator
//!
//! Drives the action plans of every deployment found in the state
//! directory against the database cluster.

use std::sync::Arc;

use anyhow::{Context, Result};
use keel_operator::{
    actions::default_registry, cluster::HttpClusterClient, config, store::FileStatusStore,
    worker::ReconcileWorker,
};
use keel_reconcile::PlanExecutor;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to KEEL_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting keel operator");
    info!(
        state_dir = %config.state_dir.display(),
        cluster_endpoint = %config.cluster_endpoint,
        abort_scope = %config.abort_scope,
        "Configuration loaded"
    );

    let registry = Arc::new(default_registry().context("Failed to build action registry")?);
    let store = Arc::new(FileStatusStore::new(config.state_dir.clone()));
    let cluster = Arc::new(HttpClusterClient::new(
        &config.cluster_endpoint,
        config.call_timeout,
    )?);

    let executor = PlanExecutor::new(registry, store.clone(), cluster).with_config(config.executor());
    let worker = ReconcileWorker::new(Arc::new(executor), store, config.reconcile_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    info!("Waiting for worker to shut down...");
    if let Err(e) = tokio::time::timeout(config.shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Reconcile worker did not shut down in time");
    }

    info!("Operator shutdown complete");
    Ok(())
}
