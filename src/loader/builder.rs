//! Construction of a `Picasso` instance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::errors::LoadResult;
use crate::domain::log::EventLog;
use crate::domain::ports::{Downloader, MemoryCachePort, RequestHandler};
use crate::infrastructure::config::PicassoConfig;
use crate::infrastructure::dispatch::{Dispatcher, DispatcherConfig, HuntContext, NetworkState, Stats};
use crate::infrastructure::handlers::{
    DataUriRequestHandler, FileRequestHandler, NetworkRequestHandler,
};
use crate::infrastructure::image::{
    DEFAULT_MEMORY_CACHE_SIZE, DEFAULT_TIMEOUT, DiskImageCache, HttpDownloader, LruMemoryCache,
};

use super::Picasso;

/// Configures and creates a `Picasso` instance.
///
/// Every collaborator has a default: a 64 MiB memory cache, an HTTP
/// downloader without disk cache, and the network, file and data URI
/// handlers. Custom handlers are consulted before the built-in ones.
pub struct PicassoBuilder {
    downloader: Option<Arc<dyn Downloader>>,
    disk_cache: Option<Arc<DiskImageCache>>,
    memory_cache: Option<Arc<dyn MemoryCachePort>>,
    memory_cache_size: u64,
    handlers: Vec<Arc<dyn RequestHandler>>,
    dispatcher: DispatcherConfig,
    timeout: Duration,
    logging_enabled: bool,
}

impl Default for PicassoBuilder {
    fn default() -> Self {
        Self {
            downloader: None,
            disk_cache: None,
            memory_cache: None,
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE,
            handlers: Vec::new(),
            dispatcher: DispatcherConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            logging_enabled: false,
        }
    }
}

impl std::fmt::Debug for PicassoBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PicassoBuilder")
            .field("memory_cache_size", &self.memory_cache_size)
            .field("handlers", &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("dispatcher", &self.dispatcher)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PicassoBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from loaded configuration, opening the disk cache.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created.
    pub async fn from_config(config: &PicassoConfig) -> LoadResult<Self> {
        let disk_cache = DiskImageCache::new(
            config.effective_disk_cache_dir(),
            config.effective_disk_cache_size(),
        )
        .await?;

        Ok(Self::new()
            .disk_cache(Arc::new(disk_cache))
            .memory_cache_size(config.memory_cache_size)
            .thread_count(config.thread_count)
            .timeout(config.timeout())
            .retry_delay(config.retry_delay())
            .batch_delay(config.batch_delay())
            .scans_network_changes(config.scans_network_changes)
            .logging_enabled(config.logging_enabled))
    }

    /// Uses a custom downloader for network requests.
    #[must_use]
    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Disk cache used by the default downloader.
    #[must_use]
    pub fn disk_cache(mut self, disk_cache: Arc<DiskImageCache>) -> Self {
        self.disk_cache = Some(disk_cache);
        self
    }

    /// Uses a custom memory cache.
    #[must_use]
    pub fn memory_cache(mut self, cache: Arc<dyn MemoryCachePort>) -> Self {
        self.memory_cache = Some(cache);
        self
    }

    /// Capacity in bytes of the default memory cache.
    #[must_use]
    pub const fn memory_cache_size(mut self, bytes: u64) -> Self {
        self.memory_cache_size = bytes;
        self
    }

    /// Registers a handler consulted before the built-in ones.
    #[must_use]
    pub fn add_request_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Initial number of workers.
    #[must_use]
    pub const fn thread_count(mut self, count: usize) -> Self {
        self.dispatcher.thread_count = count;
        self
    }

    /// HTTP timeout of the default downloader.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before a failed load is retried.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.dispatcher.retry_delay = delay;
        self
    }

    /// Delay used to coalesce deliveries.
    #[must_use]
    pub const fn batch_delay(mut self, delay: Duration) -> Self {
        self.dispatcher.batch_delay = delay;
        self
    }

    /// Replay failed loads when the network comes back.
    #[must_use]
    pub const fn scans_network_changes(mut self, enabled: bool) -> Self {
        self.dispatcher.scans_network_changes = enabled;
        self
    }

    /// Initial connectivity.
    #[must_use]
    pub const fn network_state(mut self, state: NetworkState) -> Self {
        self.dispatcher.network_state = state;
        self.dispatcher.thread_count = state.thread_count();
        self
    }

    /// Initial airplane mode.
    #[must_use]
    pub const fn airplane_mode(mut self, enabled: bool) -> Self {
        self.dispatcher.airplane_mode = enabled;
        self
    }

    /// Emit request lifecycle events at debug level.
    #[must_use]
    pub const fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Creates the instance and starts its dispatcher. Must run inside a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the default HTTP client cannot be created.
    pub fn build(self) -> LoadResult<Picasso> {
        let cache = self
            .memory_cache
            .unwrap_or_else(|| Arc::new(LruMemoryCache::new(self.memory_cache_size)));
        let stats = Arc::new(Stats::new(cache.clone()));

        let downloader: Arc<dyn Downloader> = match self.downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpDownloader::new(self.disk_cache.clone(), self.timeout)?),
        };

        let mut handlers = self.handlers;
        handlers.push(Arc::new(NetworkRequestHandler::new(downloader, stats.clone())));
        handlers.push(Arc::new(FileRequestHandler));
        handlers.push(Arc::new(DataUriRequestHandler));
        let handlers: Arc<[Arc<dyn RequestHandler>]> = handlers.into();

        let ctx = Arc::new(HuntContext {
            cache: cache.clone(),
            stats: stats.clone(),
            log: EventLog::new(self.logging_enabled),
        });

        let (main_tx, main_rx) = mpsc::unbounded_channel();
        let (dispatcher, executor) =
            Dispatcher::spawn(self.dispatcher, handlers.clone(), ctx.clone(), main_tx);

        Ok(Picasso::start(
            super::Parts {
                dispatcher,
                executor,
                cache,
                stats,
                ctx,
                handlers,
                disk_cache: self.disk_cache,
            },
            main_rx,
        ))
    }
}
