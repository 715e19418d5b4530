use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::cube::LutBuffer;

struct CacheEntry {
    lut: Arc<LutBuffer>,
    last_used: AtomicU64,
}

/// Fixed-capacity LRU of parsed cubes keyed by filename.
///
/// Entries are immutable once inserted. Lookups share the lock and bump recency with an
/// atomic tick; only insertion and eviction take the exclusive lock.
pub struct LutCache {
    capacity: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LutCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl LutCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, name: &str) -> Option<Arc<LutBuffer>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(name) {
            Some(entry) => {
                entry.last_used.store(self.next_tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.lut))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts a parsed cube, evicting the least recently used entry when full.
    /// Re-inserting a name replaces the entry; two threads racing to parse the same file
    /// both succeed and the later one wins.
    pub fn insert(&self, name: &str, lut: Arc<LutBuffer>) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !entries.contains_key(name) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(evicted = %key, capacity = self.capacity, "LUT cache eviction");
            }
        }

        entries.insert(
            name.to_string(),
            CacheEntry { lut, last_used: AtomicU64::new(self.next_tick()) },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().map(|e| e.contains_key(name)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> LutCacheStats {
        LutCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
