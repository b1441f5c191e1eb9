//! Volatile in-memory cache of encoded thumbnails.
//!
//! Stores encoded bytes rather than decoded bitmaps so that the cost of an
//! entry is its byte length and memory use stays predictable. The cache is
//! bounded by a total byte cost and an entry count; when either is exceeded
//! the least recently touched entries are dropped first. Ordering is an
//! approximation good enough for scrolling workloads, not a strict LRU
//! guarantee across concurrent callers.

use crate::cache::types::MemoryCacheConfig;
use crate::cache::{CacheKey, EncodedBytes, MemoryStats};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Entry in the memory cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: EncodedBytes,
    /// Logical access clock value, higher is more recent
    last_accessed: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<CacheKey, CacheEntry>,
    total_cost: usize,
    clock: u64,
    stats: MemoryStats,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_cost = self.total_cost.saturating_sub(entry.data.len());
        Some(entry)
    }

    fn sync_size(&mut self) {
        self.stats.size_bytes = self.total_cost;
        self.stats.entry_count = self.entries.len();
    }
}

/// In-memory cache for encoded thumbnails.
///
/// All operations are serialized by a single lock.
#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    /// Create a new memory cache with the given limits.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            config,
        }
    }

    /// Get cached bytes, refreshing the entry's recency on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<EncodedBytes> {
        let mut state = self.state.lock();
        let now = state.tick();

        let hit = state.entries.get_mut(key).map(|entry| {
            entry.last_accessed = now;
            entry.data.clone()
        });

        if hit.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        hit
    }

    /// Store bytes for a key. `None` clears the entry.
    ///
    /// An entry larger than the whole cost limit is not cached.
    pub fn set(&self, key: &CacheKey, bytes: Option<EncodedBytes>) {
        let Some(data) = bytes else {
            self.remove(key);
            return;
        };

        let mut state = self.state.lock();
        state.remove_entry(key);

        if data.len() > self.config.cost_limit || self.config.count_limit == 0 {
            debug!(
                key = %key,
                size_bytes = data.len(),
                cost_limit = self.config.cost_limit,
                "Entry exceeds memory cache limits, not caching"
            );
            state.sync_size();
            return;
        }

        let now = state.tick();
        state.total_cost += data.len();
        state.entries.insert(
            key.clone(),
            CacheEntry {
                data,
                last_accessed: now,
            },
        );

        self.evict_over_limit(&mut state);
        state.sync_size();
    }

    /// Remove a single entry.
    pub fn remove(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        state.remove_entry(key);
        state.sync_size();
    }

    /// Remove every entry.
    pub fn remove_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_cost = 0;
        state.sync_size();
    }

    /// Check if a key exists without refreshing its recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Current number of entries.
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Current total cost in bytes.
    pub fn size_bytes(&self) -> usize {
        self.state.lock().total_cost
    }

    /// Configured limits.
    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats.clone()
    }

    /// Evict least recently touched entries until both limits hold.
    fn evict_over_limit(&self, state: &mut MemoryState) {
        if state.total_cost <= self.config.cost_limit
            && state.entries.len() <= self.config.count_limit
        {
            return;
        }

        let mut order: Vec<(CacheKey, u64)> = state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed))
            .collect();
        order.sort_by_key(|(_, accessed)| *accessed);

        let mut evicted = 0u64;
        for (key, _) in order {
            if state.total_cost <= self.config.cost_limit
                && state.entries.len() <= self.config.count_limit
            {
                break;
            }
            state.remove_entry(&key);
            evicted += 1;
        }

        state.stats.evictions += evicted;
        debug!(
            evicted,
            size_bytes = state.total_cost,
            entries = state.entries.len(),
            "Memory cache eviction"
        );
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: u32) -> CacheKey {
        CacheKey::new(format!("clip-{}@64x64@2x", n))
    }

    fn bytes(len: usize) -> Option<EncodedBytes> {
        Some(Arc::new(vec![0u8; len]))
    }

    fn cache(cost_limit: usize, count_limit: usize) -> MemoryCache {
        MemoryCache::new(MemoryCacheConfig {
            cost_limit,
            count_limit,
        })
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache(1_000_000, 100);
        let data = Arc::new(vec![1, 2, 3, 4, 5]);

        cache.set(&key(1), Some(data.clone()));

        assert_eq!(cache.get(&key(1)), Some(data));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 5);
    }

    #[test]
    fn test_miss() {
        let cache = cache(1_000_000, 100);
        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_set_none_clears_entry() {
        let cache = cache(1_000_000, 100);
        cache.set(&key(1), bytes(10));
        cache.set(&key(1), None);

        assert!(!cache.contains(&key(1)));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_replace_existing_updates_cost() {
        let cache = cache(1_000_000, 100);
        cache.set(&key(1), bytes(100));
        cache.set(&key(1), bytes(30));

        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 30);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let cache = cache(1_000_000, 100);
        for i in 0..5 {
            cache.set(&key(i), bytes(10));
        }

        cache.remove(&key(0));
        assert_eq!(cache.entry_count(), 4);
        assert_eq!(cache.size_bytes(), 40);

        cache.remove_all();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.size_bytes(), 0);
        for i in 0..5 {
            assert_eq!(cache.get(&key(i)), None);
        }
    }

    #[test]
    fn test_cost_limit_evicts_oldest() {
        let cache = cache(2500, 100);

        cache.set(&key(1), bytes(1000));
        cache.set(&key(2), bytes(1000));
        cache.set(&key(3), bytes(1000));

        assert!(!cache.contains(&key(1)), "Oldest entry should be evicted");
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert!(cache.size_bytes() <= 2500);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_count_limit_evicts_oldest() {
        let cache = cache(1_000_000, 2);

        for i in 1..=5 {
            cache.set(&key(i), bytes(1));
        }

        assert_eq!(cache.entry_count(), 2);
        assert!(cache.contains(&key(4)));
        assert!(cache.contains(&key(5)));
    }

    #[test]
    fn test_access_refreshes_recency() {
        let cache = cache(2500, 100);

        cache.set(&key(1), bytes(1000));
        cache.set(&key(2), bytes(1000));
        cache.get(&key(1));
        cache.set(&key(3), bytes(1000));

        assert!(cache.contains(&key(1)), "Accessed entry should remain");
        assert!(!cache.contains(&key(2)), "Untouched entry should be evicted");
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let cache = cache(100, 10);
        cache.set(&key(1), bytes(50));
        cache.set(&key(2), bytes(101));

        assert!(cache.contains(&key(1)), "Existing entries must survive");
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.size_bytes(), 50);
    }

    #[test]
    fn test_stats_track_size() {
        let cache = cache(1_000_000, 100);
        cache.set(&key(1), bytes(5000));
        cache.get(&key(1));
        cache.get(&key(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.size_bytes, 5000);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(10_000, 1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(&key(t * 100 + i), bytes(10));
                        cache.get(&key(t * 100 + i / 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.size_bytes() <= 10_000);
        assert_eq!(cache.size_bytes(), cache.entry_count() * 10);
    }
}
