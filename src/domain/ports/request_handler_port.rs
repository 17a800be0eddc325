//! Port for per-scheme image sources.

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;

use crate::domain::entities::{LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::LoadResult;

/// What a handler produced for a request.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Encoded bytes that still need decoding.
    Bytes(Bytes),
    /// An image the handler already decoded.
    Image(DynamicImage),
}

/// Output of a successful handler load.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    /// The raw or decoded content.
    pub payload: Payload,
    /// Where the content came from.
    pub loaded_from: LoadedFrom,
    /// EXIF orientation known to the handler (1-8), if any.
    pub exif_orientation: Option<u16>,
}

impl HandlerOutput {
    /// Wraps encoded bytes.
    #[must_use]
    pub const fn bytes(bytes: Bytes, loaded_from: LoadedFrom) -> Self {
        Self {
            payload: Payload::Bytes(bytes),
            loaded_from,
            exif_orientation: None,
        }
    }

    /// Wraps a decoded image.
    #[must_use]
    pub const fn image(image: DynamicImage, loaded_from: LoadedFrom) -> Self {
        Self {
            payload: Payload::Image(image),
            loaded_from,
            exif_orientation: None,
        }
    }
}

/// Port for loading the content of a request from one kind of source.
///
/// Handlers are consulted in registration order; the first one whose
/// `can_handle` returns true serves the request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Returns true if this handler understands the request's URI.
    fn can_handle(&self, request: &Request) -> bool;

    /// Loads the content.
    async fn load(&self, request: &Request, policy: NetworkPolicy) -> LoadResult<HandlerOutput>;

    /// Number of retries granted to a failing load.
    fn retry_count(&self) -> u32 {
        0
    }

    /// Decides whether a failed load should be retried.
    fn should_retry(&self, _airplane_mode: bool, _connected: bool) -> bool {
        false
    }

    /// Returns true if failed loads may be replayed after reconnecting.
    fn supports_replay(&self) -> bool {
        false
    }
}
