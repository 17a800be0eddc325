//! Image storage and transport.
//!
//! This module provides:
//! - Memory caching of decoded images with byte-bounded LRU eviction
//! - Disk caching of raw downloads
//! - The HTTP downloader that reads through the disk cache

pub mod disk_cache;
pub mod downloader;
pub mod memory_cache;

pub use disk_cache::{
    DiskImageCache, MAX_DISK_CACHE_SIZE, MIN_DISK_CACHE_SIZE, bounded_disk_cache_size,
    default_cache_dir,
};
pub use downloader::{DEFAULT_TIMEOUT, GATEWAY_TIMEOUT, HttpDownloader};
pub use memory_cache::{CacheStats, DEFAULT_MEMORY_CACHE_SIZE, LruMemoryCache};
