//! Handler for local files.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::trace;

use crate::domain::entities::{LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{HandlerOutput, RequestHandler};

use super::has_scheme;

const FILE_SCHEME: &str = "file://";

/// Reads `file://` URIs and absolute paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileRequestHandler;

impl FileRequestHandler {
    fn path(uri: &str) -> PathBuf {
        if has_scheme(uri, FILE_SCHEME) {
            PathBuf::from(&uri[FILE_SCHEME.len()..])
        } else {
            PathBuf::from(uri)
        }
    }
}

#[async_trait]
impl RequestHandler for FileRequestHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_handle(&self, request: &Request) -> bool {
        has_scheme(&request.uri, FILE_SCHEME) || request.uri.starts_with('/')
    }

    async fn load(&self, request: &Request, _policy: NetworkPolicy) -> LoadResult<HandlerOutput> {
        let path = Self::path(&request.uri);
        let bytes = fs::read(&path)
            .await
            .map_err(|e| LoadError::io(format!("Failed to read {}: {e}", path.display())))?;
        trace!(path = %path.display(), length = bytes.len(), "File handler loaded");
        Ok(HandlerOutput::bytes(Bytes::from(bytes), LoadedFrom::Disk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Payload;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_file_uri_and_plain_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.png");
        std::fs::write(&path, b"pixels").unwrap();

        for uri in [format!("file://{}", path.display()), path.display().to_string()] {
            let request = Request::builder(uri).build().unwrap();
            assert!(FileRequestHandler.can_handle(&request));

            let output = FileRequestHandler
                .load(&request, NetworkPolicy::empty())
                .await
                .unwrap();
            assert_eq!(output.loaded_from, LoadedFrom::Disk);
            assert!(matches!(output.payload, Payload::Bytes(ref b) if &b[..] == b"pixels"));
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let request = Request::builder("file:///definitely/missing.png")
            .build()
            .unwrap();
        let err = FileRequestHandler
            .load(&request, NetworkPolicy::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
        assert_eq!(FileRequestHandler.retry_count(), 0);
    }

    #[test]
    fn test_rejects_other_schemes() {
        let request = Request::builder("https://example.com/a.png").build().unwrap();
        assert!(!FileRequestHandler.can_handle(&request));
    }
}
