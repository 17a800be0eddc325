//! Decoding and transformation services.

pub mod decoder;
pub mod transformations;
pub mod transformer;

pub use decoder::{Decoded, calculate_in_sample_size, decode, exif_orientation};
pub use transformations::{Blur, Grayscale};
pub use transformer::{apply_custom_transformations, transform};
