//! Application layer with the decode and transform pipeline.

/// Decoding and transformation services.
pub mod services;

pub use services::{Blur, Grayscale, decode, transform};
