//! Key-value cache used to bound store load on hot lookups.
//!
//! The pipeline only needs `get/set/delete/clear` by key. [`MemoryCache`] is the
//! in-process implementation with a fixed TTL per entry; other backends can be
//! plugged in through [`KeyValueCache`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[async_trait]
pub trait KeyValueCache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V);
    async fn delete(&self, key: &str);
    async fn clear(&self);
}

/// Concurrent map whose entries expire a fixed time after insertion.
pub struct MemoryCache<V> {
    entries: DashMap<String, (Instant, V)>,
    ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, (expires_at, _)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<V> KeyValueCache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (expires_at, value) = entry.value();
            if *expires_at > now {
                return Some(value.clone());
            }
        }
        // Expired entries are dropped lazily on read.
        self.entries.remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        None
    }

    async fn set(&self, key: &str, value: V) {
        self.entries
            .insert(key.to_string(), (Instant::now() + self.ttl, value));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}
