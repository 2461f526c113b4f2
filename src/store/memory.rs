use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CounterStore, StoreError};

#[derive(Default)]
struct Inner {
    counters: HashMap<String, i64>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    ttls: HashMap<String, i64>,
}

/// In-process counter store with the same atomicity guarantees as Redis
/// (one mutex around all state). Used by tests and local development; TTLs
/// are recorded but not enforced.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let value = inner.counters.entry(key.to_string()).or_insert(0);
        *value -= 1;
        Ok(*value)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get_mut(set)
            .is_some_and(|members| members.remove(member)))
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get(set)
            .is_some_and(|members| members.contains(member)))
    }

    async fn scard(&self, set: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(set).map_or(0, |members| members.len() as i64))
    }

    async fn rpush(&self, list: &str, value: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let entries = inner.lists.entry(list.to_string()).or_default();
        entries.push_back(value.to_string());
        Ok(entries.len() as i64)
    }

    async fn lpop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.lists.get_mut(list).and_then(|entries| entries.pop_front()))
    }

    async fn llen(&self, list: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.lists.get(list).map_or(0, |entries| entries.len() as i64))
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_and_decr_track_a_single_counter() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.decr("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sadd_reports_first_insert_only() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert!(store.sismember("s", "a").await.unwrap());
        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.sismember("s", "a").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lists_are_fifo() {
        let store = MemoryStore::new();
        store.rpush("q", "1").await.unwrap();
        store.rpush("q", "2").await.unwrap();
        assert_eq!(store.llen("q").await.unwrap(), 2);
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.lpop("q").await.unwrap(), None);
    }
}
