// src/engine/cache.rs
//
// Bounded cache of decoded images, keyed by input content and decode settings.
//
// Two ceilings apply at once: total bytes and entry count. Inserting past
// either evicts least-recently-used entries first. Only successful decodes are
// ever stored, so failing inputs cannot grow it.

use crate::engine::backend::DecodeRoute;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of one decode: what bytes, which loader, what decode-time shrink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: u64,
    len: usize,
    route: DecodeRoute,
    shrink: u32,
}

impl CacheKey {
    pub fn new(bytes: &[u8], route: DecodeRoute, shrink: u32) -> Self {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Self {
            digest: hasher.finish(),
            len: bytes.len(),
            route,
            shrink,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    bytes: u64,
    last_used: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    bytes: u64,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
pub struct OperationCache<V> {
    max_mem: u64,
    max_entries: usize,
    state: Mutex<CacheState<V>>,
}

impl<V> OperationCache<V> {
    pub fn new(max_mem: u64, max_entries: usize) -> Self {
        Self {
            max_mem,
            max_entries,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                bytes: 0,
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        let found = state.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            Arc::clone(&entry.value)
        });
        if found.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        found
    }

    /// Store `value`, evicting as needed. Returns false when the value alone
    /// is larger than the byte ceiling or caching is disabled.
    pub fn insert(&self, key: CacheKey, value: Arc<V>, bytes: u64) -> bool {
        if !self.admits(bytes) {
            return false;
        }

        let mut state = self.state.lock();
        if let Some(old) = state.entries.remove(&key) {
            state.bytes -= old.bytes;
        }

        while !state.entries.is_empty()
            && (state.entries.len() >= self.max_entries || state.bytes + bytes > self.max_mem)
        {
            let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| *key)
            else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&oldest) {
                state.bytes -= evicted.bytes;
                state.evictions += 1;
                tracing::trace!(target: "lazy_resize::cache", bytes = evicted.bytes, "evict");
            }
        }

        state.tick += 1;
        let last_used = state.tick;
        state.bytes += bytes;
        state.entries.insert(
            key,
            Entry {
                value,
                bytes,
                last_used,
            },
        );
        true
    }

    /// Whether a value of `bytes` could be stored at all. Lets callers skip
    /// building a value the cache would refuse.
    pub fn admits(&self, bytes: u64) -> bool {
        self.max_entries > 0 && bytes <= self.max_mem
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            bytes: state.bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    pub fn max_mem(&self) -> u64 {
        self.max_mem
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}
