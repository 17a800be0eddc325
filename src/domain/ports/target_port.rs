//! Port for receivers of loaded images.

use crate::domain::entities::LoadedImage;
use crate::domain::errors::LoadError;

/// Receives the outcome of a request submitted with `into`.
///
/// A target only ever receives the outcome of its most recent request:
/// submitting a new request for the same target cancels the previous one.
pub trait Target: Send + Sync {
    /// Called with the loaded image.
    fn on_load(&self, image: LoadedImage);

    /// Called when the request fails.
    fn on_error(&self, error: LoadError);

    /// Called before work is scheduled for a request that missed the memory cache.
    fn on_prepare(&self) {}
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::entities::LoadedFrom;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    /// Outcome recorded by `RecordingTarget`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Outcome {
        /// Image delivered with its key and origin.
        Loaded(String, LoadedFrom),
        /// Error delivered.
        Failed(LoadError),
    }

    /// Target that records every delivery.
    #[derive(Default)]
    pub struct RecordingTarget {
        outcomes: Mutex<Vec<Outcome>>,
        prepared: Mutex<usize>,
        notify: Notify,
    }

    impl RecordingTarget {
        /// Creates an empty recorder.
        pub fn new() -> Self {
            Self::default()
        }

        /// All deliveries so far.
        pub fn outcomes(&self) -> Vec<Outcome> {
            self.outcomes.lock().clone()
        }

        /// Number of `on_prepare` calls.
        pub fn prepared(&self) -> usize {
            *self.prepared.lock()
        }

        /// Waits until at least `count` deliveries happened.
        pub async fn wait_for(&self, count: usize) -> Vec<Outcome> {
            loop {
                let notified = self.notify.notified();
                {
                    let outcomes = self.outcomes.lock();
                    if outcomes.len() >= count {
                        return outcomes.clone();
                    }
                }
                notified.await;
            }
        }

        fn push(&self, outcome: Outcome) {
            self.outcomes.lock().push(outcome);
            self.notify.notify_waiters();
        }
    }

    impl Target for RecordingTarget {
        fn on_load(&self, image: LoadedImage) {
            self.push(Outcome::Loaded(image.key, image.loaded_from));
        }

        fn on_error(&self, error: LoadError) {
            self.push(Outcome::Failed(error));
        }

        fn on_prepare(&self) {
            *self.prepared.lock() += 1;
        }
    }
}
