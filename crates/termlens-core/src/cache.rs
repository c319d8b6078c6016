//! Short-lived token to coordinate cache.
//!
//! Shared between the interactive path and the region monitor. Every
//! operation holds the lock only for a map read or write; no coordinate
//! computation ever happens under it.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::config::CacheSettings;
use crate::grid::GridCoord;

#[derive(Debug, Clone, Copy)]
struct Entry {
    coord: GridCoord,
    inserted_at: Instant,
    /// Insertion sequence, used to recognize stale slots in the FIFO queue.
    seq: u64,
}

#[derive(Debug)]
struct Inner<K> {
    entries: HashMap<K, Entry>,
    /// Insertion order. A slot is live only while its seq matches the entry.
    order: VecDeque<(K, u64)>,
    next_seq: u64,
}

/// Bounded map from position token to grid coordinate with a time-to-live.
///
/// An entry is valid while `now - inserted_at < ttl`. Inserting a new key
/// into a full cache evicts the oldest insertion.
#[derive(Debug)]
pub struct CoordinateCache<K> {
    inner: Mutex<Inner<K>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K> CoordinateCache<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
            max_entries,
            ttl,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_entries, settings.ttl())
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached coordinate, or `None` when absent or expired.
    pub fn get(&self, key: &K) -> Option<GridCoord> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let entry = *inner.entries.get(key)?;
        if now.duration_since(entry.inserted_at) < self.ttl {
            return Some(entry.coord);
        }
        inner.entries.remove(key);
        trace!("Cache entry expired");
        None
    }

    /// Store a coordinate, replacing any previous value for the key.
    pub fn set(&self, key: K, coord: GridCoord) {
        if self.max_entries == 0 {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= self.max_entries {
                if !inner.evict_oldest() {
                    break;
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.clone(),
            Entry {
                coord,
                inserted_at: now,
                seq,
            },
        );
        inner.order.push_back((key, seq));

        if inner.order.len() > self.max_entries.saturating_mul(2) {
            inner.compact();
        }
    }

    /// Drop one entry, or everything when `key` is `None`.
    ///
    /// Hosts call `invalidate(None)` whenever the buffer changes (new
    /// output, clear, terminal switch).
    pub fn invalidate(&self, key: Option<&K>) {
        let mut inner = self.inner.lock();
        match key {
            Some(key) => {
                inner.entries.remove(key);
            }
            None => {
                inner.entries.clear();
                inner.order.clear();
            }
        }
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Inner<K>
where
    K: Eq + Hash,
{
    /// Remove the oldest live entry. Returns false when nothing was left.
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(key, seq)| entries.get(key).is_some_and(|e| e.seq == *seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_then_get() {
        let cache = CoordinateCache::new(10, Duration::from_secs(60));
        cache.set("a", GridCoord::new(3, 4));
        assert_eq!(cache.get(&"a"), Some(GridCoord::new(3, 4)));
        assert_eq!(cache.get(&"b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = CoordinateCache::new(10, Duration::from_millis(1000));
        cache.set(1u32, GridCoord::new(1, 1));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(cache.get(&1), Some(GridCoord::new(1, 1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn expiry_with_real_clock() {
        let cache = CoordinateCache::new(10, Duration::from_millis(30));
        cache.set(7u32, GridCoord::new(2, 2));
        assert!(cache.get(&7).is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(&7).is_none());
    }

    #[test]
    fn oldest_insertion_is_evicted() {
        let cache = CoordinateCache::new(3, Duration::from_secs(60));
        for i in 0..3u32 {
            cache.set(i, GridCoord::new(i + 1, 1));
        }
        cache.set(3, GridCoord::new(4, 1));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&0), None);
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&3).is_some());
    }

    #[test]
    fn reinsert_refreshes_position_in_queue() {
        let cache = CoordinateCache::new(2, Duration::from_secs(60));
        cache.set("a", GridCoord::new(1, 1));
        cache.set("b", GridCoord::new(2, 1));
        cache.set("a", GridCoord::new(1, 2));
        cache.set("c", GridCoord::new(3, 1));
        assert_eq!(cache.get(&"a"), Some(GridCoord::new(1, 2)));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn queue_stays_bounded_under_rewrites() {
        let cache = CoordinateCache::new(4, Duration::from_secs(60));
        for round in 0..100u32 {
            cache.set(round % 2, GridCoord::new(round + 1, 1));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.inner.lock().order.len() <= 8);
    }

    #[test]
    fn invalidate_one_or_all() {
        let cache = CoordinateCache::new(10, Duration::from_secs(60));
        cache.set("a", GridCoord::new(1, 1));
        cache.set("b", GridCoord::new(2, 1));

        cache.invalidate(Some(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.get(&"b").is_some());

        cache.invalidate(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_access() {
        let cache = Arc::new(CoordinateCache::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200u32 {
                        cache.set(t * 1000 + i, GridCoord::new(i + 1, t + 1));
                        let _ = cache.get(&(t * 1000 + i));
                        if i % 50 == 0 {
                            cache.invalidate(None);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }
}
