/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during disk cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<CacheError> for super::LoadError {
    fn from(err: CacheError) -> Self {
        Self::Io(err.to_string())
    }
}
