use std::collections::HashMap;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::config::{RedisConfig, RedisTarget};
use crate::error::StoreError;

/// The KV/queue store operations chainr needs (spec §6). Any backend that
/// can implement hash/set/list semantics plus an atomic blocking
/// pop-from-tail-push-to-head works; `RedisStore` is the one we ship.
#[async_trait]
pub trait Store: Send + Sync {
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn sadd(&self, key: &str, members: &[&str]) -> Result<(), StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn rpush(&self, key: &str, values: &[&str]) -> Result<(), StoreError>;
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;
    async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<(), StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically pops the tail of `src` and pushes it onto the head of
    /// `dst`, blocking until `src` is non-empty (spec §6, the correctness
    /// backbone of at-most-one-worker-at-a-time claims).
    async fn brpoplpush(&self, src: &str, dst: &str) -> Result<String, StoreError>;
}

/// Redis-backed `Store`, pooled with `bb8` so concurrent HTTP requests
/// (Scheduler) and concurrent job tasks (Worker) don't serialize on a
/// single connection; `brpoplpush` checks out a connection for the
/// duration of the block, which is fine because every other command goes
/// through a different pooled connection.
pub struct RedisStore {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let url = resolve_url(config)?;
        info!(target = "chainr_store", "connecting to redis");
        let manager = RedisConnectionManager::new(url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let pool = bb8::Pool::builder()
            .max_size(16)
            .build(manager)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

/// Builds the redis connection URL for the configured target. Failover and
/// sentinel resolution happens once, at startup: the first reachable
/// address (failover) or the sentinel-reported master address (sentinel)
/// is chosen and used for the lifetime of the pool.
fn resolve_url(config: &RedisConfig) -> Result<String, StoreError> {
    let host_port = match &config.target {
        RedisTarget::Single(addr) => addr.clone(),
        RedisTarget::Failover(addrs) => addrs
            .first()
            .cloned()
            .ok_or_else(|| StoreError::Connection("no redis addresses configured".into()))?,
        RedisTarget::Sentinel { addrs, master } => resolve_sentinel_master(addrs, master)?,
    };

    let auth = match &config.password {
        Some(password) if !password.is_empty() => format!(":{password}@"),
        _ => String::new(),
    };

    Ok(format!("redis://{auth}{host_port}/{}", config.db))
}

fn resolve_sentinel_master(addrs: &[String], master: &str) -> Result<String, StoreError> {
    let mut sentinel = redis::sentinel::Sentinel::build(addrs.to_vec())
        .map_err(StoreError::Command)?;
    let info = sentinel
        .master_for(master, None)
        .map_err(StoreError::Command)?
        .get_connection_info()
        .clone();
    match info.addr {
        redis::ConnectionAddr::Tcp(host, port) => Ok(format!("{host}:{port}")),
        redis::ConnectionAddr::TcpTls { host, port, .. } => Ok(format!("{host}:{port}")),
        other => Err(StoreError::Connection(format!(
            "unsupported sentinel master address: {other:?}"
        ))),
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn sadd(&self, key: &str, members: &[&str]) -> Result<(), StoreError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        conn.sadd(key, members).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.srem(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.lpush(key, value).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, values: &[&str]) -> Result<(), StoreError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        conn.rpush(key, values).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.lrem(key, count, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.del(key).await?;
        Ok(())
    }

    async fn brpoplpush(&self, src: &str, dst: &str) -> Result<String, StoreError> {
        let mut conn = self.pool.get().await?;
        // timeout 0 blocks indefinitely, matching spec §6's BRPopLPush(src, dst, 0).
        Ok(conn.brpoplpush(src, dst, 0.0).await?)
    }
}
