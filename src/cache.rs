//! In-memory TTL cache with stale reads

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A cached value and the moment it was fetched
///
/// Entries are never mutated; a refresh replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }
}

/// Keyed store with a per-instance time-to-live
///
/// Expiry is logical: an expired entry is reported absent by [`TtlCache::get`]
/// but stays available to [`TtlCache::get_stale`] for the degradation path.
/// There is no eviction; key spaces are bounded by design (one entry per coin,
/// per history range, per currency).
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    /// Creates an empty cache whose entries stay fresh for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry only while it is younger than the TTL
    pub async fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.age() < self.ttl => {
                tracing::debug!(key = ?key, "Cache HIT");
                Some(entry.clone())
            }
            Some(entry) => {
                tracing::debug!(key = ?key, age_ms = entry.age().as_millis() as u64, "Cache entry expired");
                None
            }
            None => {
                tracing::debug!(key = ?key, "Cache MISS");
                None
            }
        }
    }

    /// Returns the value only while it is younger than the TTL
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Returns the entry regardless of age
    pub async fn get_stale_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    /// Returns the value regardless of age, `None` if never populated
    pub async fn get_stale(&self, key: &K) -> Option<V> {
        self.get_stale_entry(key).await.map(|entry| entry.value)
    }

    /// Stores `value` stamped with the current time, replacing any prior entry
    pub async fn put(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            fetched_at: Instant::now(),
        };
        let mut entries = self.entries.write().await;
        tracing::debug!(key = ?key, "Cache PUT");
        entries.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
