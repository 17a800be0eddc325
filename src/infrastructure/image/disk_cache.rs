//! Disk-based cache of fetched image bytes, persisted across runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::entities::ImageId;
use crate::domain::errors::{CacheError, CacheResult};

/// Smallest disk cache size accepted from configuration (5 MiB).
pub const MIN_DISK_CACHE_SIZE: u64 = 5 * 1024 * 1024;
/// Default and largest derived disk cache size (50 MiB).
pub const MAX_DISK_CACHE_SIZE: u64 = 50 * 1024 * 1024;

const EXTENSION: &str = "img";
const STAGING_EXTENSION: &str = "part";

/// Clamps a derived cache size into `[MIN_DISK_CACHE_SIZE, MAX_DISK_CACHE_SIZE]`.
#[must_use]
pub const fn bounded_disk_cache_size(size: u64) -> u64 {
    if size < MIN_DISK_CACHE_SIZE {
        MIN_DISK_CACHE_SIZE
    } else if size > MAX_DISK_CACHE_SIZE {
        MAX_DISK_CACHE_SIZE
    } else {
        size
    }
}

/// Disk-based cache that persists raw image bytes keyed by source URL digest.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    current_size: AtomicU64,
    item_count: AtomicUsize,
}

impl DiskImageCache {
    /// Opens (creating if needed) a cache in `cache_dir`.
    ///
    /// Existing entries are counted and trimmed if they exceed `max_size`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created or read.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(io_error("create cache dir"))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(io_error("read cache dir"))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if is_cache_file(&path)
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        let cache = Self {
            cache_dir,
            max_size,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
        };
        debug!(
            dir = %cache.cache_dir.display(),
            size = total_size,
            count,
            max_size,
            "Opened disk cache"
        );

        cache.cleanup_if_needed().await;

        Ok(cache)
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Configured maximum size in bytes.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    fn cache_path(&self, id: &ImageId) -> PathBuf {
        self.cache_dir.join(format!("{}.{EXTENSION}", id.as_str()))
    }

    /// Reads the cached bytes for `id`.
    pub async fn get_bytes(&self, id: &ImageId) -> Option<Vec<u8>> {
        let path = self.cache_path(id);
        if let Ok(bytes) = fs::read(&path).await {
            trace!(id = %id, path = %path.display(), "Disk cache hit");
            Some(bytes)
        } else {
            trace!(id = %id, "Disk cache miss");
            None
        }
    }

    /// Stores raw bytes for `id`, trimming old entries if over the limit.
    ///
    /// The bytes land in a temporary file that is renamed into place, so
    /// readers never observe a partial entry.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written.
    pub async fn put_bytes(&self, id: &ImageId, bytes: &[u8]) -> CacheResult<()> {
        let path = self.cache_path(id);
        let staging = path.with_extension(STAGING_EXTENSION);

        let previous = fs::metadata(&path).await.map(|m| m.len()).ok();

        let mut file = fs::File::create(&staging)
            .await
            .map_err(io_error("create cache file"))?;
        file.write_all(bytes)
            .await
            .map_err(io_error("write cache file"))?;
        file.flush().await.map_err(io_error("flush cache file"))?;
        drop(file);
        fs::rename(&staging, &path)
            .await
            .map_err(io_error("move cache file into place"))?;

        let stored = bytes.len() as u64;
        match previous {
            Some(old) if stored >= old => {
                self.current_size.fetch_add(stored - old, Ordering::Relaxed);
            }
            Some(old) => {
                self.current_size.fetch_sub(old - stored, Ordering::Relaxed);
            }
            None => {
                self.current_size.fetch_add(stored, Ordering::Relaxed);
                self.item_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        trace!(id = %id, size = stored, "Stored bytes in disk cache");

        self.cleanup_if_needed().await;
        Ok(())
    }

    /// Removes the entry for `id`.
    pub async fn evict(&self, id: &ImageId) {
        let path = self.cache_path(id);
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(id = %id, error = %e, "Failed to evict from disk cache");
            }
        } else if let Some(s) = size {
            self.current_size.fetch_sub(s, Ordering::Relaxed);
            self.item_count.fetch_sub(1, Ordering::Relaxed);
            debug!(id = %id, "Evicted from disk cache");
        }
    }

    /// Removes every entry.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(io_error("read cache dir"))?;

        while let Some(entry) = entries.next_entry().await.map_err(io_error("read entry"))? {
            let path = entry.path();
            if is_cache_file(&path) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if bytes for `id` are cached.
    pub async fn contains(&self, id: &ImageId) -> bool {
        fs::try_exists(self.cache_path(id)).await.unwrap_or(false)
    }

    /// Deletes the least recently accessed files until the cache is at 90% of its limit.
    async fn cleanup_if_needed(&self) {
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(current_size, max_size = self.max_size, "Disk cache over limit, cleaning up");

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_cache_file(&path) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, accessed, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                trace!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(freed_size, Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(freed_size, freed_count, "Disk cache cleanup complete");
    }
}

fn io_error(context: &'static str) -> impl Fn(std::io::Error) -> CacheError {
    move |e| CacheError::IoError(format!("Failed to {context}: {e}"))
}

fn is_cache_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == EXTENSION)
}

/// Platform cache directory for fetched images.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "picasso", "picasso").map_or_else(
        || std::env::temp_dir().join("picasso").join("cache"),
        |dirs| dirs.cache_dir().join("images"),
    )
}
