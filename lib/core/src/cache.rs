//! Bounded LRU memo for retrieval results.
//!
//! Keyed by `(query, k)`. One cache belongs to one engine, and one engine to
//! one catalog snapshot, so a catalog refresh invalidates it by construction.

use crate::ranking::RetrievalResult;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

type CacheKey = (String, usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct RetrievalCache {
    // None when capacity is 0
    entries: Option<Mutex<LruCache<CacheKey, Arc<RetrievalResult>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RetrievalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, query: &str, k: usize) -> Option<Arc<RetrievalResult>> {
        let entries = self.entries.as_ref()?;
        let found = entries.lock().get(&(query.to_string(), k)).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn put(&self, query: &str, k: usize, result: Arc<RetrievalResult>) {
        if let Some(entries) = &self.entries {
            entries.lock().put((query.to_string(), k), result);
        }
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let (len, capacity) = self
            .entries
            .as_ref()
            .map(|e| {
                let guard = e.lock();
                (guard.len(), guard.cap().get())
            })
            .unwrap_or((0, 0));

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len,
            capacity,
        }
    }
}

impl std::fmt::Debug for RetrievalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalCache")
            .field("stats", &self.stats())
            .finish()
    }
}
