//! Shared key-value/queue store abstraction used by every chainr service:
//! a thin `Store` trait over the handful of redis primitives (hashes,
//! sets, lists, and an atomic blocking pop-and-push) the scheduling
//! protocol is built on, plus the worker registration/keepalive bookkeeping
//! that the Worker and Notifier both need.

pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod memory;
pub mod worker_registry;

pub use client::{RedisStore, Store};
pub use config::{RedisConfig, RedisTarget};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use worker_registry::{
    derive_worker_name, parse_record, WorkerRecord, WorkerRegistration, WorkerRegistry,
};
