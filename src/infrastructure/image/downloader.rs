//! HTTP downloader backed by the disk cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageId, NetworkPolicy};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{DownloadResponse, Downloader};

use super::disk_cache::DiskImageCache;

/// Status reported when an offline-only load misses the disk cache.
pub const GATEWAY_TIMEOUT: u16 = 504;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Downloads with `reqwest`, reading and writing raw bytes through an optional disk cache.
pub struct HttpDownloader {
    client: reqwest::Client,
    disk_cache: Option<Arc<DiskImageCache>>,
}

impl std::fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("disk_cache", &self.disk_cache.as_ref().map(|c| c.dir().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl HttpDownloader {
    /// Creates a downloader with the given timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(disk_cache: Option<Arc<DiskImageCache>>, timeout: Duration) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("picasso/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::io(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, disk_cache })
    }

    async fn from_disk(&self, id: &ImageId) -> Option<Bytes> {
        let cache = self.disk_cache.as_ref()?;
        cache.get_bytes(id).await.map(Bytes::from)
    }

    async fn download(&self, uri: &str) -> LoadResult<DownloadResponse> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| LoadError::io(format!("Request failed: {e}")))?;

        let code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| LoadError::io(format!("Failed to read body: {e}")))?;

        Ok(DownloadResponse {
            code,
            body,
            from_cache: false,
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn load(&self, uri: &str, policy: NetworkPolicy) -> LoadResult<DownloadResponse> {
        let id = ImageId::from_url(uri);

        if (policy.should_read_from_disk_cache() || policy.is_offline_only())
            && let Some(body) = self.from_disk(&id).await
        {
            trace!(uri, id = %id, "Serving from disk cache");
            return Ok(DownloadResponse {
                code: 200,
                body,
                from_cache: true,
            });
        }

        if policy.is_offline_only() {
            debug!(uri, "Offline load missed disk cache");
            return Ok(DownloadResponse {
                code: GATEWAY_TIMEOUT,
                body: Bytes::new(),
                from_cache: true,
            });
        }

        debug!(uri, "Downloading image from network");
        let response = self.download(uri).await?;

        if response.is_successful()
            && !response.body.is_empty()
            && policy.should_write_to_disk_cache()
            && let Some(cache) = &self.disk_cache
            && let Err(e) = cache.put_bytes(&id, &response.body).await
        {
            warn!(uri, error = %e, "Failed to cache to disk");
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    const URI: &str = "http://127.0.0.1:9/never.png";

    async fn downloader() -> (HttpDownloader, Arc<DiskImageCache>, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(
            DiskImageCache::new(temp.path().to_path_buf(), 1024 * 1024)
                .await
                .unwrap(),
        );
        let downloader = HttpDownloader::new(Some(cache.clone()), Duration::from_secs(1)).unwrap();
        (downloader, cache, temp)
    }

    #[tokio::test]
    async fn test_disk_hit_skips_network() {
        let (downloader, cache, _temp) = downloader().await;
        cache
            .put_bytes(&ImageId::from_url(URI), b"cached")
            .await
            .unwrap();

        let response = downloader.load(URI, NetworkPolicy::empty()).await.unwrap();
        assert_eq!(response.code, 200);
        assert!(response.from_cache);
        assert_eq!(&response.body[..], b"cached");
    }

    #[tokio::test]
    async fn test_offline_miss_is_gateway_timeout() {
        let (downloader, _cache, _temp) = downloader().await;
        let response = assert_ok!(downloader.load(URI, NetworkPolicy::OFFLINE).await);
        assert_eq!(response.code, GATEWAY_TIMEOUT);
        assert_eq!(response.content_length(), 0);
    }

    #[tokio::test]
    async fn test_offline_reads_disk_even_with_no_cache() {
        let (downloader, cache, _temp) = downloader().await;
        cache
            .put_bytes(&ImageId::from_url(URI), b"cached")
            .await
            .unwrap();

        let policy = NetworkPolicy::OFFLINE | NetworkPolicy::NO_CACHE;
        let response = downloader.load(URI, policy).await.unwrap();
        assert!(response.from_cache);
    }

    #[tokio::test]
    async fn test_transport_failure_is_io_error() {
        let (downloader, _cache, _temp) = downloader().await;
        let err = assert_err!(downloader.load(URI, NetworkPolicy::NO_CACHE).await);
        assert!(matches!(err, LoadError::Io(_)));
    }
}
