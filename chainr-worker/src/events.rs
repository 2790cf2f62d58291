//! Emits a lifecycle [`chainr_events::Event`] onto the shared event queue.
//! Best-effort per spec §7: a failed emission is logged and does not alter
//! run or job state.

use std::sync::Arc;

use chainr_events::Event;
use chainr_store::{keys, Store};
use tracing::warn;

pub async fn emit(store: &Arc<dyn Store>, event: Event) {
    let key = Event::new_key();
    let event_type = event.event_type.to_string();
    if let Err(err) = store
        .hset(
            &key,
            &[
                ("type", event_type.as_str()),
                ("title", event.title.as_str()),
                ("message", event.message.as_str()),
            ],
        )
        .await
    {
        warn!(error = %err, key = %key, "failed to persist event, skipping emission");
        return;
    }
    if let Err(err) = store.lpush(keys::events_notif(), &key).await {
        warn!(error = %err, key = %key, "failed to enqueue event for the notifier");
    }
}
