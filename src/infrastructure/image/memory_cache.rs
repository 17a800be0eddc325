//! In-memory LRU image cache bounded by decoded byte size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{image_byte_size, key_source};
use crate::domain::ports::MemoryCachePort;

/// Default maximum size of the memory cache (64 MiB).
pub const DEFAULT_MEMORY_CACHE_SIZE: u64 = 64 * 1024 * 1024;

struct Entry {
    image: Arc<DynamicImage>,
    size: u64,
}

struct Inner {
    entries: LruCache<String, Entry>,
    size: u64,
}

/// In-memory LRU cache for decoded images.
///
/// Entries are evicted least recently used first until the total decoded
/// size fits `max_size`. An image larger than `max_size` is never stored.
pub struct LruMemoryCache {
    inner: Mutex<Inner>,
    max_size: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
}

impl LruMemoryCache {
    /// Creates a cache holding at most `max_size` bytes.
    #[must_use]
    pub fn new(max_size: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            len: inner.entries.len(),
            size: inner.size,
        }
    }

    /// Looks up an image without promoting it or touching the counters.
    pub fn peek(&self, key: &str) -> Option<Arc<DynamicImage>> {
        self.inner.lock().entries.peek(key).map(|e| e.image.clone())
    }

    /// Evicts least recently used entries until the size fits `max_size`.
    fn trim_to(&self, inner: &mut Inner, max_size: u64) {
        while inner.size > max_size {
            let Some((key, entry)) = inner.entries.pop_lru() else {
                inner.size = 0;
                break;
            };
            inner.size -= entry.size;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key.escape_debug(), size = entry.size, "Evicted from memory cache");
        }
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of stored images.
    pub puts: u64,
    /// Number of images evicted to make room.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub len: usize,
    /// Current size in bytes.
    pub size: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses, {} puts, {} evictions)",
            self.len, self.size, self.hit_rate, self.hits, self.misses, self.puts, self.evictions
        )
    }
}

impl MemoryCachePort for LruMemoryCache {
    fn get(&self, key: &str) -> Option<Arc<DynamicImage>> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key.escape_debug(), "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key.escape_debug(), "Memory cache miss");
            None
        }
    }

    fn set(&self, key: String, image: Arc<DynamicImage>) {
        let size = image_byte_size(&image);
        let mut inner = self.inner.lock();

        if size > self.max_size {
            if let Some(previous) = inner.entries.pop(&key) {
                inner.size -= previous.size;
            }
            debug!(
                key = %key.escape_debug(),
                size,
                max_size = self.max_size,
                "Image larger than memory cache, not storing"
            );
            return;
        }

        self.puts.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = inner.entries.put(key, Entry { image, size }) {
            inner.size -= previous.size;
        }
        inner.size += size;
        self.trim_to(&mut inner, self.max_size);
    }

    fn size(&self) -> u64 {
        self.inner.lock().size
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size = 0;
        debug!("Cleared memory image cache");
    }

    fn clear_key_uri(&self, uri: &str) {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| key_source(key) == uri)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(entry) = inner.entries.pop(key) {
                inner.size -= entry.size;
            }
        }
        debug!(uri, removed = keys.len(), "Cleared memory cache entries for source");
    }
}
