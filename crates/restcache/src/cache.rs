//! Process-wide resource cache keyed by request URL
//!
//! The cache holds at most one [`Response`] per URL, exactly as the URL was
//! issued (no normalization). Population is first-writer-wins: when several
//! requests for the same uncached resource race, the first store becomes
//! visible and every later store is discarded.
//!
//! Entries are never evicted. An entry whose TTL has elapsed stays in place
//! and is reported as [`CacheLookup::Stale`] so the caller can revalidate it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::trace;

use crate::response::Response;

static GLOBAL_RESOURCE_CACHE: LazyLock<Arc<ResourceCache>> =
    LazyLock::new(|| Arc::new(ResourceCache::new()));

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Usable as-is, no network call needed
    Fresh(Arc<Response>),
    /// Present but must be re-checked with the origin
    Stale(Arc<Response>),
}

impl CacheLookup {
    pub fn response(&self) -> &Arc<Response> {
        match self {
            Self::Fresh(response) | Self::Stale(response) => response,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Concurrent URL → response store with insert-if-absent population
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: DashMap<String, Arc<Response>>,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    rejected_stores: AtomicU64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every builder that was not given its own
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_RESOURCE_CACHE)
    }

    /// Stored response for `url`, regardless of freshness
    pub fn get(&self, url: &str) -> Option<Arc<Response>> {
        self.entries.get(url).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up `url` and classify the entry against `now`
    pub fn lookup(&self, url: &str, now: DateTime<Utc>) -> Option<CacheLookup> {
        let Some(response) = self.get(url) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(url, "resource cache miss");
            return None;
        };

        if response.is_fresh_at(now) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(url, "resource cache hit");
            Some(CacheLookup::Fresh(response))
        } else {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
            trace!(url, "resource cache hit needs revalidation");
            Some(CacheLookup::Stale(response))
        }
    }

    /// Store `response` only if `url` has no entry yet.
    ///
    /// Returns whether the store took effect.
    pub fn set_nx(&self, url: &str, response: Arc<Response>) -> bool {
        let stored = match self.entries.entry(url.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(response);
                true
            }
        };
        self.record_store(stored);
        stored
    }

    /// Replace the entry for `url` only while it still holds `observed`.
    ///
    /// This refreshes a stale entry after a full response without clobbering
    /// an entry another request stored in the meantime. An empty slot is
    /// filled as with [`set_nx`](Self::set_nx).
    pub fn replace_stale(&self, url: &str, observed: &Arc<Response>, response: Arc<Response>) -> bool {
        let stored = match self.entries.entry(url.to_owned()) {
            Entry::Occupied(mut slot) if Arc::ptr_eq(slot.get(), observed) => {
                slot.insert(response);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(response);
                true
            }
        };
        self.record_store(stored);
        stored
    }

    fn record_store(&self, stored: bool) {
        if stored {
            self.stores.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_stores.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            rejected_stores: self.rejected_stores.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub rejected_stores: u64,
    pub entries: u64,
}

impl CacheStats {
    /// Fresh hits as a percentage of all lookups
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.stale_hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            (self.hits as f64) / (lookups as f64) * 100.0
        }
    }
}
