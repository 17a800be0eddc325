//! Infrastructure layer with caches, sources and scheduling.

/// Application configuration.
pub mod config;
/// Dispatcher, worker pool and hunters.
pub mod dispatch;
/// Per-scheme request handlers.
pub mod handlers;
/// Image caching and downloading.
pub mod image;

pub use config::{CliArgs, ConfigStorage, LogLevel, PicassoConfig};
pub use dispatch::{Dispatcher, DispatcherConfig, DispatcherHandle, NetworkState, Stats, Transport};
pub use handlers::{DataUriRequestHandler, FileRequestHandler, NetworkRequestHandler};
pub use image::{CacheStats, DiskImageCache, HttpDownloader, LruMemoryCache};
