//! Domain types for loaded images.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Unique identifier for a cached source.
/// Generated from a hash of the source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(pub String);

impl ImageId {
    /// Creates a new `ImageId` from any string-like input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an `ImageId` from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadedFrom {
    /// Served by the in-memory LRU cache or an inline source.
    Memory,
    /// Read from the disk cache or a local file.
    Disk,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for LoadedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A decoded and transformed image ready for use.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Fingerprint of the request that produced the image.
    pub key: String,
    /// The image itself.
    pub image: Arc<DynamicImage>,
    /// Origin of the pixels.
    pub loaded_from: LoadedFrom,
}

/// Approximate number of bytes an image occupies in memory.
#[must_use]
pub fn image_byte_size(image: &DynamicImage) -> u64 {
    image.as_bytes().len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_from_url() {
        let url = "https://example.com/attachments/123/456/image.png";
        let id = ImageId::from_url(url);
        assert!(!id.0.is_empty());
        assert_eq!(id.0.len(), 32);
    }

    #[test]
    fn test_image_id_consistency() {
        let url = "https://example.com/image.png";
        assert_eq!(ImageId::from_url(url), ImageId::from_url(url));
        assert_ne!(
            ImageId::from_url(url),
            ImageId::from_url("https://example.com/other.png")
        );
    }

    #[test]
    fn test_image_byte_size() {
        let rgba = DynamicImage::new_rgba8(10, 4);
        assert_eq!(image_byte_size(&rgba), 160);
        let rgb = DynamicImage::new_rgb8(10, 4);
        assert_eq!(image_byte_size(&rgb), 120);
    }

    #[test]
    fn test_loaded_from_display() {
        assert_eq!(LoadedFrom::Memory.to_string(), "memory");
        assert_eq!(LoadedFrom::Network.to_string(), "network");
    }
}
