use thiserror::Error;

use crate::domain::entities::NetworkPolicy;

/// Result type for image loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can occur while loading an image.
///
/// Errors are cloned when a single piece of work fails on behalf of several
/// joined callers, so every variant carries owned, cloneable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The request was rejected while being built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler accepts the URI.
    #[error("unrecognized type of request: {uri}")]
    UnrecognizedRequest {
        /// Source URI of the request.
        uri: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {code}")]
    Response {
        /// HTTP status code.
        code: u16,
        /// Network policy of the failed attempt.
        policy: NetworkPolicy,
    },

    /// A disk cache hit carried an empty body.
    #[error("received response with 0 content-length header")]
    ContentLength,

    /// An offline-only load missed the disk cache.
    #[error("image is not available in the offline cache")]
    NotCached,

    /// Transport or filesystem failure.
    #[error("io error: {0}")]
    Io(String),

    /// The bytes are not a supported image.
    #[error("decode error: {0}")]
    Decode(String),

    /// A custom transformation failed or panicked.
    #[error("transformation {key} failed after {index} previous transformation(s): {message}")]
    Transformation {
        /// Key of the failing transformation.
        key: String,
        /// Number of transformations that ran before it.
        index: usize,
        /// Failure or panic message.
        message: String,
    },

    /// The request was cancelled before delivery.
    #[error("request cancelled")]
    Cancelled,

    /// The loader was shut down.
    #[error("image loader has been shut down")]
    ShutDown,
}

impl LoadError {
    /// Builds `InvalidRequest`.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Builds `Io`.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Builds `Decode`.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Returns true for failures that may go away on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ContentLength)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
