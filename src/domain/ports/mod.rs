mod downloader_port;
mod memory_cache_port;
mod request_handler_port;
pub(crate) mod target_port;
pub(crate) mod transformation_port;

pub use downloader_port::{DownloadResponse, Downloader};
pub use memory_cache_port::MemoryCachePort;
pub use request_handler_port::{HandlerOutput, Payload, RequestHandler};
pub use target_port::Target;
pub use transformation_port::{Transformation, TransformationFailure};

#[cfg(test)]
pub mod mocks {
    pub use super::downloader_port::mock::MockDownloader;
    pub use super::request_handler_port::mock::MockRequestHandler;
    pub use super::target_port::mock::{Outcome, RecordingTarget};
    pub use super::transformation_port::mock::MockTransformation;
}
