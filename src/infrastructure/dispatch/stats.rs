//! Lock-free counters feeding `StatsSnapshot`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;

use crate::domain::entities::{StatsSnapshot, image_byte_size};
use crate::domain::ports::MemoryCachePort;

/// Running totals for one loader instance.
pub struct Stats {
    cache: Arc<dyn MemoryCachePort>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_download_size: AtomicU64,
    total_original_bitmap_size: AtomicU64,
    total_transformed_bitmap_size: AtomicU64,
    download_count: AtomicU64,
    original_bitmap_count: AtomicU64,
    transformed_bitmap_count: AtomicU64,
}

impl Stats {
    /// Creates zeroed counters reporting the size of `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn MemoryCachePort>) -> Self {
        Self {
            cache,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            total_download_size: AtomicU64::new(0),
            total_original_bitmap_size: AtomicU64::new(0),
            total_transformed_bitmap_size: AtomicU64::new(0),
            download_count: AtomicU64::new(0),
            original_bitmap_count: AtomicU64::new(0),
            transformed_bitmap_count: AtomicU64::new(0),
        }
    }

    /// Records a memory cache hit.
    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a memory cache miss.
    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a network download of `size` bytes.
    pub fn download_finished(&self, size: u64) {
        self.download_count.fetch_add(1, Ordering::Relaxed);
        self.total_download_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Records a freshly decoded image.
    pub fn bitmap_decoded(&self, image: &DynamicImage) {
        self.original_bitmap_count.fetch_add(1, Ordering::Relaxed);
        self.total_original_bitmap_size
            .fetch_add(image_byte_size(image), Ordering::Relaxed);
    }

    /// Records the output of a transformation step.
    pub fn bitmap_transformed(&self, image: &DynamicImage) {
        self.transformed_bitmap_count.fetch_add(1, Ordering::Relaxed);
        self.total_transformed_bitmap_size
            .fetch_add(image_byte_size(image), Ordering::Relaxed);
    }

    /// Captures the current values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let total_download_size = self.total_download_size.load(Ordering::Relaxed);
        let total_original_bitmap_size = self.total_original_bitmap_size.load(Ordering::Relaxed);
        let total_transformed_bitmap_size =
            self.total_transformed_bitmap_size.load(Ordering::Relaxed);
        let download_count = self.download_count.load(Ordering::Relaxed);
        let original_bitmap_count = self.original_bitmap_count.load(Ordering::Relaxed);
        let transformed_bitmap_count = self.transformed_bitmap_count.load(Ordering::Relaxed);

        StatsSnapshot {
            max_size: self.cache.max_size(),
            size: self.cache.size(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            total_download_size,
            total_original_bitmap_size,
            total_transformed_bitmap_size,
            average_download_size: average(total_download_size, download_count),
            average_original_bitmap_size: average(total_original_bitmap_size, original_bitmap_count),
            average_transformed_bitmap_size: average(
                total_transformed_bitmap_size,
                transformed_bitmap_count,
            ),
            download_count,
            original_bitmap_count,
            transformed_bitmap_count,
            time_stamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

const fn average(total: u64, count: u64) -> u64 {
    match total.checked_div(count) {
        Some(value) => value,
        None => 0,
    }
}
