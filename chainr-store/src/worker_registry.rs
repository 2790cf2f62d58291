//! Shared keepalive/registration bookkeeping for anything that claims work
//! off a queue and needs the recycler to notice when it dies (spec §4.5's
//! Worker keepalive, reused verbatim by the Notifier instead of
//! duplicating the same hash/set bookkeeping in both binaries, per
//! §9 "Keepalive/registration loop is identical in shape").
//!
//! The `worker:<name>` hash mirrors spec §3 exactly: `{queue, processQueue,
//! expiry}`, with `expiry` an absolute RFC3339 timestamp the Recycler reads
//! and compares to now, rather than a relative age computed from a
//! last-seen mark.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::client::Store;
use crate::error::StoreError;
use crate::keys;

/// How often a registered worker refreshes its `expiry`.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(4);

/// How far into the future each keepalive pushes `expiry`. A worker that
/// misses roughly four consecutive ticks is considered dead.
pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(15);

/// Derives a stable worker name from the host's hostname, the way the
/// original worker and notifier binaries each did independently. Unlike
/// the original, a hostname lookup failure does not panic (REDESIGN
/// FLAGS: a long-running service should not crash on a transient
/// environment quirk) — it falls back to a random, still-unique name and
/// logs a warning.
pub fn derive_worker_name() -> String {
    match gethostname::gethostname().into_string() {
        Ok(name) if !name.is_empty() => name,
        _ => {
            let fallback = format!("worker-{}", uuid::Uuid::new_v4());
            warn!(name = %fallback, "could not read hostname, using a generated worker name");
            fallback
        }
    }
}

/// A named entry in the `workers` set: the global queue it claims work
/// from (`runs:work` for the job Worker, `events:notif` for the Notifier)
/// and the per-worker processing list its in-flight items sit on while
/// claimed, so the Recycler can return either kind to its source queue the
/// same way.
#[derive(Debug, Clone)]
pub struct WorkerRegistration {
    pub name: String,
    pub queue: String,
    pub processing_queue: String,
}

/// Registers a worker, refreshes its keepalive on an interval, and removes
/// it on clean shutdown. Held for the lifetime of the claim loop that owns
/// it.
pub struct WorkerRegistry {
    store: Arc<dyn Store>,
    registration: WorkerRegistration,
}

impl WorkerRegistry {
    /// Adds `name` to the `workers` set and writes its initial
    /// `worker:<name>` hash.
    pub async fn register(
        store: Arc<dyn Store>,
        name: String,
        queue: String,
        processing_queue: String,
    ) -> Result<Self, StoreError> {
        let registration = WorkerRegistration {
            name,
            queue,
            processing_queue,
        };
        let registry = Self { store, registration };
        registry.touch().await?;
        registry
            .store
            .sadd(keys::workers(), &[&registry.registration.name])
            .await?;
        info!(worker = %registry.registration.name, "registered worker");
        Ok(registry)
    }

    pub fn name(&self) -> &str {
        &self.registration.name
    }

    pub fn processing_queue(&self) -> &str {
        &self.registration.processing_queue
    }

    /// Writes a fresh `expiry` (now + [`KEEPALIVE_EXPIRY`]) to the
    /// `worker:<name>` hash, proving the caller is alive.
    pub async fn touch(&self) -> Result<(), StoreError> {
        let expiry = Utc::now() + KEEPALIVE_EXPIRY;
        self.store
            .hset(
                &keys::worker(&self.registration.name),
                &[
                    ("queue", self.registration.queue.as_str()),
                    ("processQueue", self.registration.processing_queue.as_str()),
                    ("expiry", expiry.to_rfc3339().as_str()),
                ],
            )
            .await
    }

    /// Runs `touch` on `KEEPALIVE_INTERVAL` until the process is told to
    /// stop. Intended to be spawned as its own task alongside the claim
    /// loop.
    pub async fn run_keepalive(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.touch().await {
                        warn!(worker = %self.registration.name, error = %err, "keepalive failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Removes this worker from the `workers` set and deletes its hash.
    /// Called on graceful shutdown; crashed workers are instead cleaned up
    /// by the recycler after their keepalive expires.
    pub async fn deregister(&self) -> Result<(), StoreError> {
        self.store
            .srem(keys::workers(), &self.registration.name)
            .await?;
        self.store.del(&keys::worker(&self.registration.name)).await?;
        info!(worker = %self.registration.name, "deregistered worker");
        Ok(())
    }
}

/// The parsed contents of a `worker:<name>` hash, as the Recycler reads it.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub queue: String,
    pub process_queue: String,
    pub expiry: DateTime<Utc>,
}

/// Parses a `worker:<name>` hash into a [`WorkerRecord`]. Returns `None` if
/// any required field is missing or malformed, which the Recycler treats
/// the same as an expired worker (spec §4.6: any inconsistency here means
/// the worker is no longer trustworthy).
pub fn parse_record(fields: &std::collections::HashMap<String, String>) -> Option<WorkerRecord> {
    let queue = fields.get("queue")?.clone();
    let process_queue = fields.get("processQueue")?.clone();
    let expiry = DateTime::parse_from_rfc3339(fields.get("expiry")?)
        .ok()?
        .with_timezone(&Utc);
    Some(WorkerRecord {
        queue,
        process_queue,
        expiry,
    })
}

impl WorkerRecord {
    pub fn is_expired(&self) -> bool {
        self.expiry < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_expiry_is_not_expired() {
        let record = WorkerRecord {
            queue: "runs:work".into(),
            process_queue: "runs:worker:w1".into(),
            expiry: Utc::now() + Duration::from_secs(15),
        };
        assert!(!record.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let record = WorkerRecord {
            queue: "runs:work".into(),
            process_queue: "runs:worker:w1".into(),
            expiry: Utc::now() - Duration::from_secs(1),
        };
        assert!(record.is_expired());
    }

    #[test]
    fn derive_worker_name_is_non_empty() {
        assert!(!derive_worker_name().is_empty());
    }

    #[test]
    fn parse_record_requires_all_fields() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("queue".to_string(), "runs:work".to_string());
        assert!(parse_record(&fields).is_none());

        fields.insert("processQueue".to_string(), "runs:worker:w1".to_string());
        fields.insert("expiry".to_string(), Utc::now().to_rfc3339());
        assert!(parse_record(&fields).is_some());
    }

    #[test]
    fn parse_record_rejects_malformed_expiry() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("queue".to_string(), "runs:work".to_string());
        fields.insert("processQueue".to_string(), "runs:worker:w1".to_string());
        fields.insert("expiry".to_string(), "not-a-timestamp".to_string());
        assert!(parse_record(&fields).is_none());
    }
}
