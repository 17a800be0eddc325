//! Port for fetching raw bytes over the network.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::entities::NetworkPolicy;
use crate::domain::errors::LoadResult;

/// Raw response returned by a downloader.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    /// HTTP status code.
    pub code: u16,
    /// Response body.
    pub body: Bytes,
    /// True if the body was served from the disk cache.
    pub from_cache: bool,
}

impl DownloadResponse {
    /// Returns true for 2xx responses.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Body length in bytes.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Port for the HTTP client collaborator.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Loads the resource at `uri`, honouring the network policy.
    ///
    /// Transport failures are reported as `LoadError::Io`; unsuccessful HTTP
    /// statuses are returned as responses so callers can inspect the code.
    async fn load(&self, uri: &str, policy: NetworkPolicy) -> LoadResult<DownloadResponse>;

    /// Releases resources held by the downloader.
    fn shutdown(&self) {}
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Downloader replaying scripted responses.
    #[derive(Default)]
    pub struct MockDownloader {
        script: Mutex<VecDeque<LoadResult<DownloadResponse>>>,
        policies: Mutex<Vec<NetworkPolicy>>,
        calls: AtomicUsize,
    }

    impl MockDownloader {
        /// Creates an empty downloader; unscripted loads return 404.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response.
        pub fn push(&self, response: LoadResult<DownloadResponse>) {
            self.script.lock().push_back(response);
        }

        /// Queues a response with the given code and body.
        pub fn push_response(&self, code: u16, body: &[u8], from_cache: bool) {
            self.push(Ok(DownloadResponse {
                code,
                body: Bytes::copy_from_slice(body),
                from_cache,
            }));
        }

        /// Policies passed to each load.
        pub fn policies(&self) -> Vec<NetworkPolicy> {
            self.policies.lock().clone()
        }

        /// Number of loads.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Downloader for MockDownloader {
        async fn load(&self, _uri: &str, policy: NetworkPolicy) -> LoadResult<DownloadResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.policies.lock().push(policy);
            let scripted = self.script.lock().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(DownloadResponse {
                    code: 404,
                    body: Bytes::new(),
                    from_cache: false,
                })
            })
        }
    }
}
