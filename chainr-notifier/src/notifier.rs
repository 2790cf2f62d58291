//! The Notifier's claim loop (spec §4.7): mirrors the Worker's claim
//! discipline for events instead of runs.

use std::sync::Arc;

use chainr_store::{keys, Store, StoreError};
use tracing::{error, warn};

/// A sink for a fetched event, injected so the claim loop can be tested
/// without asserting on stdout.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event_type: &str, title: &str, message: &str);
}

pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn dispatch(&self, event_type: &str, title: &str, message: &str) {
        crate::sink::dispatch(event_type, title, message);
    }
}

pub struct Notifier {
    store: Arc<dyn Store>,
    processing_queue: String,
    sink: Arc<dyn EventSink>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, processing_queue: String, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            processing_queue,
            sink,
        }
    }

    /// Claims one event key, fetches its hash, dispatches it, and closes
    /// out the processing list. A claim or fetch failure is returned to the
    /// caller, whose retry loop backs off and tries again.
    pub async fn claim_and_dispatch_one(&self) -> Result<(), StoreError> {
        let event_key = self
            .store
            .brpoplpush(keys::events_notif(), &self.processing_queue)
            .await?;

        let fields = match self.store.hgetall(&event_key).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(event = %event_key, error = %err, "failed to fetch event, re-queueing for redelivery");
                if let Err(requeue_err) = self.requeue(&event_key).await {
                    error!(event = %event_key, error = %requeue_err, "failed to re-queue event after fetch failure, it may be stranded");
                }
                return Err(err);
            }
        };

        let event_type = fields.get("type").cloned().unwrap_or_default();
        let title = fields.get("title").cloned().unwrap_or_default();
        let message = fields.get("message").cloned().unwrap_or_default();
        self.sink.dispatch(&event_type, &title, &message);

        if let Err(err) = self
            .store
            .lrem(&self.processing_queue, -1, &event_key)
            .await
        {
            warn!(event = %event_key, error = %err, "failed to remove dispatched event from the processing list");
        }

        Ok(())
    }

    /// Returns a claimed event to the pending queue and closes it out of
    /// this worker's processing list. A live notifier whose keepalive
    /// keeps refreshing is never reclaimed by the Recycler (§4.6 only
    /// reclaims expired workers), so a fetch failure that just logged and
    /// left the key on the processing list would strand the event
    /// permanently; re-queueing it keeps the at-least-once delivery §4.7
    /// relies on.
    async fn requeue(&self, event_key: &str) -> Result<(), StoreError> {
        self.store.rpush(keys::events_notif(), &[event_key]).await?;
        self.store.lrem(&self.processing_queue, -1, event_key).await
    }
}
