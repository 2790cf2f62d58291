//! Redis connection settings, read from the environment the way the
//! original's `work`/`notif`/`sched` binaries each did independently
//! (`REDIS_ADDR`, `REDIS_PASSWORD`, `REDIS_DB`). This crate centralizes
//! that reading once instead of three times, and adds the multi-address
//! and sentinel forms named in the external interface.

use std::env;

use tracing::warn;

/// Where to find the redis deployment backing the shared store.
#[derive(Debug, Clone)]
pub enum RedisTarget {
    /// A single `host:port` address.
    Single(String),
    /// Several `host:port` addresses to try in order, for simple failover.
    Failover(Vec<String>),
    /// A sentinel-monitored deployment; `addrs` are the sentinel
    /// endpoints, `master` is the monitored master's name.
    Sentinel { addrs: Vec<String>, master: String },
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub target: RedisTarget,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    /// Reads `REDIS_ADDR`, `REDIS_ADDRS`, `REDIS_MASTER`, `REDIS_PASSWORD`
    /// and `REDIS_DB` from the environment. `REDIS_MASTER` takes a sentinel
    /// reading of `REDIS_ADDRS`; otherwise `REDIS_ADDRS` is a plain
    /// failover list; otherwise `REDIS_ADDR` is a single address, falling
    /// back to `redis:6379` to match the original's default.
    pub fn from_env() -> Self {
        let password = env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty());
        let db = match env::var("REDIS_DB") {
            Ok(val) => match val.parse::<i64>() {
                Ok(db) => db,
                Err(_) => {
                    warn!(value = %val, "invalid REDIS_DB value, using default 0");
                    0
                }
            },
            Err(_) => 0,
        };

        let addrs: Vec<String> = env::var("REDIS_ADDRS")
            .ok()
            .map(|val| {
                val.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let target = if let Ok(master) = env::var("REDIS_MASTER") {
            Self::sentinel_target(addrs, master)
        } else if !addrs.is_empty() {
            RedisTarget::Failover(addrs)
        } else {
            let addr = env::var("REDIS_ADDR").unwrap_or_else(|_| "redis:6379".to_string());
            RedisTarget::Single(addr)
        };

        Self {
            target,
            password,
            db,
        }
    }

    fn sentinel_target(addrs: Vec<String>, master: String) -> RedisTarget {
        let addrs = if addrs.is_empty() {
            vec!["redis:26379".to_string()]
        } else {
            addrs
        };
        RedisTarget::Sentinel { addrs, master }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [
            "REDIS_ADDR",
            "REDIS_ADDRS",
            "REDIS_MASTER",
            "REDIS_PASSWORD",
            "REDIS_DB",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_to_single_address() {
        clear_env();
        let config = RedisConfig::from_env();
        match config.target {
            RedisTarget::Single(addr) => assert_eq!(addr, "redis:6379"),
            other => panic!("expected single target, got {other:?}"),
        }
        assert_eq!(config.db, 0);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_db_falls_back_to_zero() {
        clear_env();
        env::set_var("REDIS_DB", "not-a-number");
        let config = RedisConfig::from_env();
        assert_eq!(config.db, 0);
        clear_env();
    }

    #[test]
    #[serial]
    fn multi_addrs_without_master_is_failover() {
        clear_env();
        env::set_var("REDIS_ADDRS", "redis-a:6379 redis-b:6379");
        let config = RedisConfig::from_env();
        match config.target {
            RedisTarget::Failover(addrs) => {
                assert_eq!(addrs, vec!["redis-a:6379", "redis-b:6379"])
            }
            other => panic!("expected failover target, got {other:?}"),
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn master_with_addrs_is_sentinel() {
        clear_env();
        env::set_var("REDIS_ADDRS", "sentinel-a:26379");
        env::set_var("REDIS_MASTER", "mymaster");
        let config = RedisConfig::from_env();
        match config.target {
            RedisTarget::Sentinel { addrs, master } => {
                assert_eq!(addrs, vec!["sentinel-a:26379"]);
                assert_eq!(master, "mymaster");
            }
            other => panic!("expected sentinel target, got {other:?}"),
        }
        clear_env();
    }
}
