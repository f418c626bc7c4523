//! In-memory memoization with a time-to-live.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Shared TTL map. Clones share the same storage.
///
/// Entries are never mutated in place; once expired they read as misses and
/// the next `insert` replaces them.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Arc<RwLock<HashMap<K, Entry<V>>>>,
    ttl: Duration,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ttl: self.ttl,
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().await;
        map.get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        if self.is_disabled() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.inner.write().await.insert(key, Entry { value, expires_at });
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        before - map.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
