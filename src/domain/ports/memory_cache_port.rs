//! Port definition for the in-memory image cache.

use std::sync::Arc;

use image::DynamicImage;

/// Port for the cache of decoded, transformed images keyed by fingerprint.
/// Implementations must be thread-safe.
pub trait MemoryCachePort: Send + Sync {
    /// Attempts to get an image, promoting it on hit.
    fn get(&self, key: &str) -> Option<Arc<DynamicImage>>;

    /// Stores an image.
    fn set(&self, key: String, image: Arc<DynamicImage>);

    /// Current size in bytes.
    fn size(&self) -> u64;

    /// Maximum size in bytes.
    fn max_size(&self) -> u64;

    /// Number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every image.
    fn clear(&self);

    /// Removes every image whose fingerprint was derived from `uri`.
    fn clear_key_uri(&self, uri: &str);
}
