//! An in-process `Store` implementation for unit tests of the Scheduler,
//! Worker, Recycler and Notifier logic, so those crates don't need a live
//! redis instance to exercise their control flow.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::client::Store;
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, Vec<String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// A `Store` backed by in-memory maps, guarded by a single mutex. Not
/// meant to be fast, only to behave like redis closely enough for tests:
/// `brpoplpush` actually blocks (via a `Notify`) until an item is pushed.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn sadd(&self, key: &str, members: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.sets.entry(key.to_string()).or_default();
        for member in members {
            if !entry.iter().any(|m| m == member) {
                entry.push(member.to_string());
            }
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.sets.get_mut(key) {
            entry.retain(|m| m != member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).cloned().unwrap_or_default())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn rpush(&self, key: &str, values: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.lists.entry(key.to_string()).or_default();
        for value in values {
            entry.push_back(value.to_string());
        }
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let list = match inner.lists.get(key) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };
        let len = list.len() as isize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let normalize = |idx: isize| -> isize {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx.min(len - 1)
            }
        };
        let start = normalize(start);
        let stop = normalize(stop);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(list) = inner.lists.get_mut(key) {
            if count == 0 {
                list.retain(|v| v != value);
            } else {
                let mut remaining = count.unsigned_abs();
                if count > 0 {
                    let mut kept = VecDeque::new();
                    for item in list.drain(..) {
                        if remaining > 0 && item == value {
                            remaining -= 1;
                        } else {
                            kept.push_back(item);
                        }
                    }
                    *list = kept;
                } else {
                    let mut kept = VecDeque::new();
                    for item in list.drain(..).rev() {
                        if remaining > 0 && item == value {
                            remaining -= 1;
                        } else {
                            kept.push_front(item);
                        }
                    }
                    *list = kept;
                }
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    async fn brpoplpush(&self, src: &str, dst: &str) -> Result<String, StoreError> {
        loop {
            // Registered before the check so a push racing with this check
            // (and thus its notify_waiters() call) is never missed: a
            // `Notified` created before a notification fires still resolves
            // immediately the first time it's polled.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(value) = inner.lists.entry(src.to_string()).or_default().pop_back() {
                    inner
                        .lists
                        .entry(dst.to_string())
                        .or_default()
                        .push_front(value.clone());
                    return Ok(value);
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_hash_fields() {
        let store = MemoryStore::new();
        store.hset("k", &[("a", "1"), ("b", "2")]).await.unwrap();
        assert_eq!(store.hget("k", "a").await.unwrap(), Some("1".into()));
        let all = store.hgetall("k").await.unwrap();
        assert_eq!(all.get("b"), Some(&"2".to_string()));
    }

    #[tokio::test]
    async fn brpoplpush_waits_for_a_push() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let reader = store.clone();
        let handle = tokio::spawn(async move { reader.brpoplpush("src", "dst").await.unwrap() });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.rpush("src", &["job-1"]).await.unwrap();

        let popped = handle.await.unwrap();
        assert_eq!(popped, "job-1");
        assert_eq!(store.lrange("dst", 0, -1).await.unwrap(), vec!["job-1"]);
    }

    #[tokio::test]
    async fn lrem_removes_matching_entries() {
        let store = MemoryStore::new();
        store
            .rpush("q", &["a", "b", "a", "c"])
            .await
            .unwrap();
        store.lrem("q", 0, "a").await.unwrap();
        assert_eq!(store.lrange("q", 0, -1).await.unwrap(), vec!["b", "c"]);
    }
}
