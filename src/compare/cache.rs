//! Cache of finished comparison results.
//!
//! The diff pipeline is deterministic, so a result for a given pair of
//! locators can be reused verbatim. Callers that need a fresh read bust the
//! cache by changing a locator (for example with a `?t=` query token).
//!
//! # Size-Based Eviction
//!
//! Entries are weighed by their RGBA overlay bytes. Least-recently-used
//! entries are evicted when the total exceeds capacity. A capacity of zero disables caching.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use super::engine::ComparisonResult;

/// Default cache capacity: 64MB.
pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Upper bound on entries, independent of byte size.
const DEFAULT_MAX_ENTRIES: usize = 4096;

// =============================================================================
// Cache Key
// =============================================================================

/// Exact `(baseline, follow_up)` locator pair.
///
/// Order matters: swapping the locators swaps growth and shrinkage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparisonKey {
    pub baseline: Arc<str>,
    pub follow_up: Arc<str>,
}

impl ComparisonKey {
    pub fn new(baseline: impl Into<Arc<str>>, follow_up: impl Into<Arc<str>>) -> Self {
        Self {
            baseline: baseline.into(),
            follow_up: follow_up.into(),
        }
    }
}

// =============================================================================
// Result Cache
// =============================================================================

struct CacheInner {
    entries: LruCache<ComparisonKey, (Arc<ComparisonResult>, usize)>,
    current_size: usize,
}

/// LRU cache of comparison results with byte-based capacity.
///
/// Thread-safe; share it across tasks through the engine.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

impl ResultCache {
    /// Create a cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RESULT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of results.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(
                    NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
                ),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Whether caching is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    /// Look up a result, marking it recently used.
    pub async fn get(&self, key: &ComparisonKey) -> Option<Arc<ComparisonResult>> {
        let mut inner = self.inner.lock().await;
        inner.entries.get(key).map(|(result, _)| Arc::clone(result))
    }

    /// Store a result, evicting least-recently-used entries as needed.
    ///
    /// Results larger than the whole cache are not stored.
    pub async fn put(&self, key: ComparisonKey, result: Arc<ComparisonResult>) {
        let size = result.byte_size();
        if size > self.max_size {
            return;
        }

        let mut inner = self.inner.lock().await;

        // Returns the replaced entry, or the LRU entry when the entry bound is hit
        if let Some((_, (_, evicted_size))) = inner.entries.push(key, (result, size)) {
            inner.current_size = inner.current_size.saturating_sub(evicted_size);
        }
        inner.current_size += size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, (_, evicted_size))) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted_size);
                }
                None => break,
            }
        }
    }

    /// Remove a single entry.
    pub async fn remove(&self, key: &ComparisonKey) -> Option<Arc<ComparisonResult>> {
        let mut inner = self.inner.lock().await;
        let (result, size) = inner.entries.pop(key)?;
        inner.current_size = inner.current_size.saturating_sub(size);
        Some(result)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Current total size in bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
