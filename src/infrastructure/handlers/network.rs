//! Handler for `http` and `https` sources.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::domain::entities::{LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{Downloader, HandlerOutput, RequestHandler};
use crate::infrastructure::dispatch::Stats;

use super::has_scheme;

/// Retries granted to network loads.
pub const NETWORK_RETRY_COUNT: u32 = 2;

/// Loads remote images through a `Downloader`.
pub struct NetworkRequestHandler {
    downloader: Arc<dyn Downloader>,
    stats: Arc<Stats>,
}

impl NetworkRequestHandler {
    /// Creates a handler recording downloads into `stats`.
    #[must_use]
    pub fn new(downloader: Arc<dyn Downloader>, stats: Arc<Stats>) -> Self {
        Self { downloader, stats }
    }
}

#[async_trait]
impl RequestHandler for NetworkRequestHandler {
    fn name(&self) -> &'static str {
        "network"
    }

    fn can_handle(&self, request: &Request) -> bool {
        has_scheme(&request.uri, "http://") || has_scheme(&request.uri, "https://")
    }

    async fn load(&self, request: &Request, policy: NetworkPolicy) -> LoadResult<HandlerOutput> {
        let response = self.downloader.load(&request.uri, policy).await?;

        if !response.is_successful() {
            return Err(LoadError::Response {
                code: response.code,
                policy,
            });
        }

        let loaded_from = if response.from_cache {
            LoadedFrom::Disk
        } else {
            LoadedFrom::Network
        };

        let length = response.content_length();
        if loaded_from == LoadedFrom::Disk && length == 0 {
            return Err(LoadError::ContentLength);
        }
        if loaded_from == LoadedFrom::Network && length > 0 {
            self.stats.download_finished(length);
        }
        trace!(uri = %request.uri, length, from = %loaded_from, "Network handler loaded");

        Ok(HandlerOutput::bytes(response.body, loaded_from))
    }

    fn retry_count(&self) -> u32 {
        NETWORK_RETRY_COUNT
    }

    fn should_retry(&self, _airplane_mode: bool, connected: bool) -> bool {
        connected
    }

    fn supports_replay(&self) -> bool {
        true
    }
}
