//! The Worker's claim loop (spec §4.3): claims runs off the shared pending
//! queue one at a time, each onto a fresh run-processing task, and never
//! blocks on a run's completion.

use std::sync::Arc;

use chainr_cloud::CloudProvider;
use chainr_store::{keys, Store, WorkerRegistry};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::run_processor::RunProcessor;

/// How long the claim loop backs off after a store error before retrying
/// (spec §4.3: "it waits briefly and retries; it does not exit").
const CLAIM_RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub struct Worker {
    store: Arc<dyn Store>,
    cloud: Arc<dyn CloudProvider>,
    registry: Arc<WorkerRegistry>,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>, cloud: Arc<dyn CloudProvider>, registry: WorkerRegistry) -> Self {
        Self {
            store,
            cloud,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    /// Runs forever: claims a run key, spawns a processing task for it,
    /// and immediately loops back to claim the next one.
    pub async fn run_claim_loop(&self) -> ! {
        let processing_queue = self.registry.processing_queue().to_string();
        loop {
            let run_key = match self
                .store
                .brpoplpush(keys::runs_work(), &processing_queue)
                .await
            {
                Ok(run_key) => run_key,
                Err(err) => {
                    warn!(error = %err, "failed to claim a run, retrying");
                    sleep(CLAIM_RETRY_BACKOFF).await;
                    continue;
                }
            };

            info!(run = %run_key, "claimed run");
            let processor = RunProcessor::new(self.store.clone(), self.cloud.clone());
            let store = self.store.clone();
            let processing_queue = processing_queue.clone();
            tokio::spawn(async move {
                processor.process(&run_key).await;
                if let Err(err) = store.lrem(&processing_queue, 0, &run_key).await {
                    error!(run = %run_key, error = %err, "failed to remove run from processing queue");
                }
            });
        }
    }
}
