//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Request lifecycle logging.
pub mod log;
/// Port definitions.
pub mod ports;

pub use entities::{LoadedFrom, LoadedImage, Request};
pub use errors::{LoadError, LoadResult};
