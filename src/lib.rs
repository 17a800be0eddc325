//! Picasso - asynchronous image loading and caching.
//!
//! Requests describe a source URI plus resize, crop, rotation and custom
//! transformations. Identical requests in flight are merged, results are
//! kept in a byte-bounded memory cache, raw downloads in a disk cache, and
//! work runs on a bounded, priority-ordered worker pool.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing decoding and transformations.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, sources and scheduling.
pub mod infrastructure;
/// Public facade.
pub mod loader;

pub use domain::entities::{Gravity, LoadedFrom, LoadedImage, MemoryPolicy, NetworkPolicy, Priority};
pub use domain::errors::{LoadError, LoadResult};
pub use domain::ports::{Target, Transformation};
pub use loader::{Picasso, PicassoBuilder, RequestCreator};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "picasso";
