//! The Notifier binary: a reliable event consumer that dispatches
//! START/SUCCESS/FAILURE events to stdout (spec §4.7).

mod notifier;
mod sink;

use std::sync::Arc;

use anyhow::Result;
use chainr_config::{RedisConfig, ServiceConfig};
use chainr_store::{derive_worker_name, keys, RedisStore, WorkerRegistry};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::notifier::{Notifier, StdoutSink};

/// How long the claim loop backs off after a store error before retrying.
const CLAIM_RETRY_BACKOFF: Duration = Duration::from_secs(2);

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

    let name = derive_worker_name();
    let processing_queue = keys::events_notifier(&name);
    let registration = WorkerRegistry::register(
        store.clone(),
        name.clone(),
        keys::events_notif().to_string(),
        processing_queue.clone(),
    )
    .await?;

    let registry = Arc::new(registration);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keepalive = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.run_keepalive(shutdown_rx).await })
    };

    let notifier = Notifier::new(store, processing_queue, Arc::new(StdoutSink));

    info!(notifier = %name, "chainr-notifier started");

    tokio::select! {
        _ = run_claim_loop(&notifier) => {}
        _ = listen_for_shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = keepalive.await;
    registry.deregister().await?;

    Ok(())
}

async fn run_claim_loop(notifier: &Notifier) -> ! {
    loop {
        if let Err(err) = notifier.claim_and_dispatch_one().await {
            warn!(error = %err, "failed to claim or dispatch an event, retrying");
            sleep(CLAIM_RETRY_BACKOFF).await;
        }
    }
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
