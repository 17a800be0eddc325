//! Port for user-supplied image transformations.

use image::DynamicImage;

/// Error type returned by a failing transformation.
pub type TransformationFailure = Box<dyn std::error::Error + Send + Sync>;

/// A custom transformation applied after the built-in geometry step.
///
/// Implementations take ownership of the input image and return the
/// transformed one. The `key` participates in the request fingerprint, so two
/// transformations producing different output must report different keys.
pub trait Transformation: Send + Sync {
    /// Transforms the image.
    ///
    /// # Errors
    /// Returns an error if the transformation cannot be applied.
    fn transform(&self, source: DynamicImage) -> Result<DynamicImage, TransformationFailure>;

    /// Returns a stable identifier for this transformation and its parameters.
    fn key(&self) -> String;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transformation that records invocations and optionally fails.
    pub struct MockTransformation {
        key: String,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MockTransformation {
        /// Creates a pass-through transformation.
        pub fn new(key: impl Into<String>) -> Self {
            Self {
                key: key.into(),
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Creates a transformation that always fails.
        pub fn failing(key: impl Into<String>) -> Self {
            Self {
                fail: true,
                ..Self::new(key)
            }
        }

        /// Number of times `transform` ran.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transformation for MockTransformation {
        fn transform(&self, source: DynamicImage) -> Result<DynamicImage, TransformationFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("mock transformation failure".into());
            }
            Ok(source)
        }

        fn key(&self) -> String {
            self.key.clone()
        }
    }
}
