//! Byte-budget LRU cache of decoded pages
//!
//! Capacity is a byte budget, not an entry count, since a page decoded for a
//! phone screen and the same page decoded for a 4K monitor differ by an order
//! of magnitude. Recency is strict access order: a hit on `get` refreshes it.
//!
//! Every mutation (insert, eviction, recency update, byte accounting) happens
//! under one mutex, so the running byte total is never observed torn.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::processing::{CacheKey, DecodedPage};

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub entries: usize,
    /// Bytes held by cached pages
    pub memory_used: usize,
    /// Configured byte budget
    pub memory_limit: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to get back under budget
    pub evictions: u64,
    /// Entries dropped because their accounting no longer matched
    pub dropped_corrupt: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization; above 1.0 only for a lone oversized page
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    page: Arc<DecodedPage>,
    /// Size charged against the budget when the entry was inserted.
    bytes: usize,
    /// Access sequence number, for diagnostics.
    last_access: u64,
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    total_bytes: usize,
    budget_bytes: usize,
    access_seq: u64,
    stats: CacheStats,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    /// Remove an entry and release its bytes.
    ///
    /// Returns false when the running total could not cover the entry, in
    /// which case the total is rebuilt from the remaining entries.
    fn release(&mut self, key: &CacheKey, entry: &CacheEntry) -> bool {
        match self.total_bytes.checked_sub(entry.bytes) {
            Some(rest) => {
                self.total_bytes = rest;
                true
            }
            None => {
                warn!(key = %key, bytes = entry.bytes, total = self.total_bytes, "Cache byte accounting underflow, rebuilding total");
                self.total_bytes = self.entries.iter().map(|(_, e)| e.bytes).sum();
                false
            }
        }
    }

    fn evict_if_over_budget(&mut self) -> usize {
        let mut evicted = 0;
        while self.total_bytes > self.budget_bytes && self.entries.len() > 1 {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.release(&key, &entry);
            self.stats.evictions += 1;
            evicted += 1;
            debug!(key = %key, bytes = entry.bytes, last_access = entry.last_access, "Evicted page from cache");
        }
        evicted
    }
}

/// Thread-safe byte-budget LRU cache.
///
/// # Example
///
/// ```
/// use manga_page_pipeline::cache::ImageCache;
///
/// let cache = ImageCache::new(64 * 1024 * 1024);
/// assert!(cache.is_empty());
/// assert_eq!(cache.stats().memory_limit, 64 * 1024 * 1024);
/// ```
pub struct ImageCache {
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                budget_bytes,
                access_seq: 0,
                stats: CacheStats {
                    memory_limit: budget_bytes,
                    ..Default::default()
                },
            }),
        }
    }

    /// Look up a page. A hit refreshes recency.
    ///
    /// An entry whose recorded size no longer matches its bitmap is dropped
    /// and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedPage>> {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        let consistent = match state.entries.get_mut(key) {
            None => {
                state.stats.misses += 1;
                debug!(key = %key, "Cache miss");
                return None;
            }
            Some(entry) => {
                entry.last_access = seq;
                entry.bytes == entry.page.byte_size()
            }
        };
        if !consistent {
            if let Some(entry) = state.entries.pop(key) {
                warn!(key = %key, recorded = entry.bytes, actual = entry.page.byte_size(), "Dropping corrupt cache entry");
                state.release(key, &entry);
            }
            state.stats.dropped_corrupt += 1;
            state.stats.misses += 1;
            return None;
        }
        state.stats.hits += 1;
        debug!(key = %key, "Cache hit");
        state.entries.peek(key).map(|e| Arc::clone(&e.page))
    }

    /// True if the key is cached, without touching recency or stats.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Insert or replace a page, then evict down to the budget.
    pub fn put(&self, key: CacheKey, page: Arc<DecodedPage>) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        let bytes = page.byte_size();
        let previous = state.entries.push(
            key.clone(),
            CacheEntry {
                page,
                bytes,
                last_access: seq,
            },
        );
        // `push` hands back the replaced entry for an existing key.
        if let Some((old_key, old)) = previous {
            if old_key == key {
                let total = state.total_bytes;
                state.total_bytes = total.saturating_sub(old.bytes);
            }
        }
        state.total_bytes += bytes;
        debug!(key = %key, bytes, total = state.total_bytes, "Cached page");
        state.evict_if_over_budget();
    }

    /// Evict least recently used entries until the total fits the budget or a
    /// single entry remains. Returns the number of evicted entries.
    pub fn evict_if_over_budget(&self) -> usize {
        self.state.lock().evict_if_over_budget()
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Arc<DecodedPage>> {
        let mut state = self.state.lock();
        let entry = state.entries.pop(key)?;
        state.release(key, &entry);
        Some(entry.page)
    }

    /// Remove every entry whose key matches. Returns how many were removed.
    pub fn remove_where(&self, mut predicate: impl FnMut(&CacheKey) -> bool) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            if let Some(entry) = state.entries.pop(key) {
                state.release(key, &entry);
            }
        }
        doomed.len()
    }

    /// Drop every cached page of a book.
    pub fn invalidate_book(&self, book: &str) -> usize {
        let removed = self.remove_where(|k| &*k.page.book == book);
        if removed > 0 {
            debug!(book, removed, "Invalidated cached pages");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    pub fn budget_bytes(&self) -> usize {
        self.state.lock().budget_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            memory_used: state.total_bytes,
            ..state.stats
        }
    }
}
