//! Concurrent map whose entries expire after a fixed retention period
//!
//! Idempotency state is keyed by time bucket, so an entry can only be hit
//! again while its bucket is current. `ExpiringMap` stamps every entry with
//! its insertion instant and sweeps entries older than the retention period.
//! A sweep runs on insert, at most once per retention period.
//!
//! Instants come from `tokio::time`, so paused test clocks drive expiry.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, (V, Instant)>,
    retention: Duration,
    last_sweep: Mutex<Instant>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty map
    ///
    /// # Arguments
    ///
    /// * `retention` - How long an entry stays reachable after insertion
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Value stored under `key`, inserting `make()` if there is none
    ///
    /// Concurrent callers with the same key all receive the value of whoever
    /// inserted first.
    ///
    /// # Arguments
    ///
    /// * `key` - Lookup key
    /// * `make` - Produces the value when the key is vacant
    ///
    /// # Returns
    ///
    /// A clone of the stored value
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.sweep_if_due();
        self.entries
            .entry(key)
            .or_insert_with(|| (make(), Instant::now()))
            .0
            .clone()
    }

    /// Value stored under `key`, if it has not been swept yet
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.0.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry older than the retention period
    ///
    /// # Returns
    ///
    /// The number of entries removed
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, (_, inserted)| inserted.elapsed() < retention);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "expired idempotency entries swept");
        }
        removed
    }

    fn sweep_if_due(&self) {
        // a sweep already in progress on another thread is enough
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if last.elapsed() < self.retention {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_insert_wins() {
        let map: ExpiringMap<&str, u32> = ExpiringMap::new(Duration::from_secs(60));
        assert_eq!(map.get_or_insert_with("a", || 1), 1);
        assert_eq!(map.get_or_insert_with("a", || 2), 1);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_retention() {
        let map: ExpiringMap<&str, u32> = ExpiringMap::new(Duration::from_secs(60));
        map.get_or_insert_with("old", || 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        map.get_or_insert_with("young", || 2);
        assert_eq!(map.len(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        map.get_or_insert_with("new", || 3);

        assert!(!map.contains_key(&"old"));
        assert_eq!(map.get(&"young"), Some(2));
        assert_eq!(map.get(&"new"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_fresh_entries() {
        let map: ExpiringMap<u64, u64> = ExpiringMap::new(Duration::from_secs(10));
        for key in 0..5 {
            map.get_or_insert_with(key, || key);
        }
        assert_eq!(map.sweep(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(map.sweep(), 5);
        assert!(map.is_empty());
    }
}
