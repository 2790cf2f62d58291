//! The Scheduler binary: loads configuration, connects to the shared
//! store, and serves the HTTP surface described in spec §6.

mod error;
mod http;
mod scheduler;
mod status;

use std::sync::Arc;

use anyhow::Result;
use chainr_config::{RedisConfig, ServiceConfig};
use chainr_store::RedisStore;
use tracing::info;

use crate::scheduler::Scheduler;

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
    let store = match RedisStore::connect(&redis_config).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the store");
            std::process::exit(1);
        }
    };

    let scheduler = Arc::new(Scheduler::new(Arc::new(store)));
    let app = http::router(scheduler);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "chainr-scheduler listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(listen_for_shutdown_signal())
        .await?;

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
