//! The Recycler binary: a single-process loop that returns expired
//! workers' in-flight items to their source queue (spec §4.6).

mod recycler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chainr_config::{RedisConfig, ServiceConfig};
use chainr_store::RedisStore;
use tracing::info;

use crate::recycler::Recycler;

const TICK_INTERVAL: Duration = Duration::from_secs(10);

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

    let recycler = Recycler::new(Arc::new(store));
    info!("chainr-recycler started");

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(err) = recycler.tick().await {
            tracing::warn!(error = %err, "recycler tick aborted, retrying next cycle");
        }
    }
}
