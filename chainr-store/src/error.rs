use thiserror::Error;

/// Failures talking to the KV/queue store. Every `Store` operation in this
/// crate surfaces one of these; callers (Scheduler/Worker/Recycler/Notifier)
/// decide whether to retry or abort based on the variant.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to redis: {0}")]
    Connection(String),

    #[error("redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("could not check out a pooled connection: {0}")]
    Pool(#[from] bb8::RunError<redis::RedisError>),
}
