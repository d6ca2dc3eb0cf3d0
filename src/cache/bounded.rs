use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::persistence::{Snapshot, SnapshotEntry};

struct StoredEntry<T> {
    value: T,
    created_at: Instant,
    /// Wall-clock creation time, carried for snapshot export.
    stored_at: DateTime<Utc>,
}

/// Generic capacity+TTL bounded key/value store.
///
/// Eviction is by oldest *insertion*, not oldest access; re-inserting an
/// existing key replaces its value but keeps its insertion position.
/// Expired entries are purged lazily on read. Used directly for ephemeral
/// per-task partial results, and as the policy template `ResultCache`
/// specializes.
pub struct BoundedStore<T> {
    entries: HashMap<String, StoredEntry<T>>,
    insertion_order: VecDeque<String>,
    max_entries: usize,
    ttl: Duration,
}

impl<T> BoundedStore<T> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Look up a live entry. An entry past its TTL is removed and
    /// reported as absent.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        if self.is_expired(key) {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.value = value;
            existing.created_at = Instant::now();
            existing.stored_at = Utc::now();
            return;
        }

        while self.entries.len() >= self.max_entries {
            if let Some(oldest) = self.insertion_order.pop_front() {
                debug!(key = %oldest, "Evicting oldest-inserted entry at capacity");
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }

        self.entries.insert(
            key.clone(),
            StoredEntry {
                value,
                created_at: Instant::now(),
                stored_at: Utc::now(),
            },
        );
        self.insertion_order.push_back(key);
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.insertion_order.retain(|k| k != key);
        }
        removed.map(|e| e.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key) && !self.is_expired(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    fn is_expired(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.created_at.elapsed() > self.ttl)
    }
}

impl<T: Serialize> BoundedStore<T> {
    /// Export live entries as an opaque snapshot map for the optional
    /// persistence collaborator.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for key in &self.insertion_order {
            if let Some(entry) = self.entries.get(key) {
                if entry.created_at.elapsed() > self.ttl {
                    continue;
                }
                snapshot.insert(
                    key.clone(),
                    SnapshotEntry {
                        value: serde_json::to_value(&entry.value)?,
                        timestamp: entry.stored_at,
                    },
                );
            }
        }
        Ok(snapshot)
    }
}

impl<T: DeserializeOwned> BoundedStore<T> {
    /// Rebuild store contents from a snapshot, preserving original ages so
    /// TTL expiry keeps counting from the original creation time. Entries
    /// already past the TTL are dropped. Undecodable entries are skipped.
    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) {
        self.clear();
        let now = Utc::now();
        for (key, entry) in snapshot.iter() {
            let age = (now - entry.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age > self.ttl {
                continue;
            }
            let Ok(value) = serde_json::from_value(entry.value.clone()) else {
                debug!(key = %key, "Skipping undecodable snapshot entry");
                continue;
            };
            // checked_sub: the snapshot may predate this process
            let created_at = Instant::now()
                .checked_sub(age)
                .unwrap_or_else(Instant::now);
            self.entries.insert(
                key.clone(),
                StoredEntry {
                    value,
                    created_at,
                    stored_at: entry.timestamp,
                },
            );
            self.insertion_order.push_back(key.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut store = BoundedStore::new(4, Duration::from_secs(60));
        store.insert("a", 1);
        assert_eq!(store.get("a"), Some(&1));
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn capacity_evicts_exactly_first_inserted() {
        let mut store = BoundedStore::new(3, Duration::from_secs(60));
        store.insert("a", 1);
        store.insert("b", 2);
        store.insert("c", 3);
        store.insert("d", 4);

        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(&2));
        assert_eq!(store.get("c"), Some(&3));
        assert_eq!(store.get("d"), Some(&4));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn reinsert_keeps_insertion_position() {
        let mut store = BoundedStore::new(2, Duration::from_secs(60));
        store.insert("a", 1);
        store.insert("b", 2);
        store.insert("a", 10); // refresh, not reorder
        store.insert("c", 3); // "a" is still oldest-inserted

        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(&2));
        assert_eq!(store.get("c"), Some(&3));
    }

    #[test]
    fn ttl_expiry_is_a_miss() {
        let mut store = BoundedStore::new(4, Duration::from_millis(10));
        store.insert("a", 1);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(store.get("a"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_round_trip_preserves_values() {
        let mut store = BoundedStore::new(4, Duration::from_secs(60));
        store.insert("a", "alpha".to_string());
        store.insert("b", "beta".to_string());

        let snapshot = store.export_snapshot().unwrap();
        let mut restored: BoundedStore<String> = BoundedStore::new(4, Duration::from_secs(60));
        restored.restore_snapshot(&snapshot);

        assert_eq!(restored.get("a"), Some(&"alpha".to_string()));
        assert_eq!(restored.get("b"), Some(&"beta".to_string()));
    }

    #[test]
    fn restore_drops_entries_past_ttl() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "old".to_string(),
            SnapshotEntry {
                value: serde_json::json!("stale"),
                timestamp: Utc::now() - chrono::Duration::seconds(120),
            },
        );

        let mut store: BoundedStore<String> = BoundedStore::new(4, Duration::from_secs(60));
        store.restore_snapshot(&snapshot);
        assert!(store.is_empty());
    }
}
