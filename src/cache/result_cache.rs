use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::Result;

use super::key::cache_key;

struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    last_accessed: Instant,
    hits: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    insertion_order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Result cache keyed by a stable hash of call parameters.
///
/// TTL-expired entries are purged on read and count as misses. A hit
/// bumps the entry's hit count and access time; eviction nonetheless
/// stays oldest-*inserted* — a deliberately simpler policy than LRU,
/// since result freshness is governed by the TTL, not by access order.
pub struct ResultCache<T> {
    inner: Mutex<Inner<T>>,
    max_entries: usize,
    ttl: Duration,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    /// Look up by call parameters. Returns a clone of the cached value.
    pub fn get<P: Serialize>(&self, params: &P) -> Result<Option<T>> {
        let key = cache_key(params)?;
        Ok(self.get_by_key(&key))
    }

    pub fn set<P: Serialize>(&self, params: &P, value: T) -> Result<()> {
        let key = cache_key(params)?;
        self.set_by_key(key, value);
        Ok(())
    }

    /// The common path: return on hit, otherwise await `compute`, store
    /// the result, and return it. The lock is never held across the await.
    pub async fn get_or_compute<P, F, Fut>(&self, params: &P, compute: F) -> Result<T>
    where
        P: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = cache_key(params)?;
        if let Some(value) = self.get_by_key(&key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set_by_key(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.insertion_order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    fn get_by_key(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();

        let expired = inner
            .entries
            .get(key)
            .is_some_and(|e| e.created_at.elapsed() > self.ttl);
        if expired {
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
            inner.misses += 1;
            trace!(key = %key, "Cache entry expired on read");
            return None;
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.hits += 1;
                entry.last_accessed = Instant::now();
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn set_by_key(&self, key: String, value: T) {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.entries.get_mut(&key) {
            existing.value = value;
            existing.created_at = Instant::now();
            return;
        }

        while inner.entries.len() >= self.max_entries {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
                debug!(key = %oldest, "Cache at capacity, evicted oldest-inserted entry");
            } else {
                break;
            }
        }

        let now = Instant::now();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: now,
                last_accessed: now,
                hits: 0,
            },
        );
        inner.insertion_order.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_value() {
        let cache: ResultCache<String> = ResultCache::new(8, Duration::from_secs(60));
        cache.set(&"params", "result".to_string()).unwrap();
        assert_eq!(cache.get(&"params").unwrap(), Some("result".to_string()));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache: ResultCache<String> = ResultCache::new(8, Duration::from_millis(10));
        cache.set(&"params", "result".to_string()).unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(&"params").unwrap(), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn capacity_evicts_first_inserted_key() {
        let cache: ResultCache<u32> = ResultCache::new(2, Duration::from_secs(60));
        cache.set(&"a", 1).unwrap();
        cache.set(&"b", 2).unwrap();
        cache.set(&"c", 3).unwrap();

        assert_eq!(cache.get(&"a").unwrap(), None);
        assert_eq!(cache.get(&"b").unwrap(), Some(2));
        assert_eq!(cache.get(&"c").unwrap(), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn get_or_compute_skips_compute_on_hit() {
        let cache: ResultCache<String> = ResultCache::new(8, Duration::from_secs(60));
        let first = cache
            .get_or_compute(&"p", || async { Ok("computed".to_string()) })
            .await
            .unwrap();
        assert_eq!(first, "computed");

        let second = cache
            .get_or_compute(&"p", || async {
                panic!("must not recompute on hit");
                #[allow(unreachable_code)]
                Ok(String::new())
            })
            .await
            .unwrap();
        assert_eq!(second, "computed");
    }

    #[tokio::test]
    async fn get_or_compute_propagates_compute_failure() {
        let cache: ResultCache<String> = ResultCache::new(8, Duration::from_secs(60));
        let result = cache
            .get_or_compute(&"p", || async {
                Err(crate::error::FlightdeckError::Backend("boom".into()))
            })
            .await;
        assert!(result.is_err());
        // A failed compute stores nothing
        assert_eq!(cache.get(&"p").unwrap(), None);
    }
}
