//! The Worker binary: claims runs off `runs:work`, drives each through
//! its dependency-gated jobs, and keeps its keepalive fresh so the
//! Recycler can tell it's alive (spec §4.3, §4.5).

mod dependency;
mod error;
mod events;
mod run_processor;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use chainr_cloud::KubernetesProvider;
use chainr_config::{RedisConfig, ServiceConfig};
use chainr_store::{derive_worker_name, keys, RedisStore, WorkerRegistry};
use tokio::sync::watch;
use tracing::info;

use crate::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err:?}");
            std::process::exit(1);
        }
    };

    if let Err(err) = chainr_config::init_logger(&config.log_level, config.pretty_logging) {
        eprintln!("failed to initialize logging: {err:?}");
        std::process::exit(1);
    }

    let redis_config = RedisConfig::from_env();
    let store: Arc<dyn chainr_store::Store> = match RedisStore::connect(&redis_config).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the store");
            std::process::exit(1);
        }
    };

    let cloud: Arc<dyn chainr_cloud::CloudProvider> = match KubernetesProvider::connect().await {
        Ok(provider) => Arc::new(provider),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the cloud provider");
            std::process::exit(1);
        }
    };

    let name = derive_worker_name();
    let processing_queue = keys::runs_worker(&name);
    let registration = WorkerRegistry::register(
        store.clone(),
        name.clone(),
        keys::runs_work().to_string(),
        processing_queue,
    )
    .await?;

    let worker = Worker::new(store, cloud, registration);
    let registry = worker.registry();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keepalive = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.run_keepalive(shutdown_rx).await })
    };

    info!(worker = %name, "chainr-worker started");

    tokio::select! {
        _ = worker.run_claim_loop() => {}
        _ = listen_for_shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = keepalive.await;
    registry.deregister().await?;

    Ok(())
}

/// Waits for either Ctrl+C or SIGTERM, whichever comes first.
async fn listen_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
