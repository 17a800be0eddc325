//! A single caller's interest in a request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::DynamicImage;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::image::{LoadedFrom, LoadedImage};
use super::policy::{MemoryPolicy, NetworkPolicy, Priority};
use super::request::Request;
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::Target;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of the receiver an action delivers to.
///
/// Target-bound actions are keyed by the target's address so that a new
/// request for the same target replaces the old one. Every other action gets
/// a key of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    /// Address of a shared `Target`.
    Target(usize),
    /// Action without an external receiver.
    Detached(u64),
}

impl TargetKey {
    /// Key for a shared target.
    #[must_use]
    pub fn of(target: &Arc<dyn Target>) -> Self {
        Self::Target(Arc::as_ptr(target).cast::<()>() as usize)
    }
}

/// How an action hands over its result.
pub enum Delivery {
    /// Invoke the target callbacks.
    Target(Arc<dyn Target>),
    /// Reply to a caller awaiting the result.
    Reply(Mutex<Option<oneshot::Sender<LoadResult<LoadedImage>>>>),
    /// Warm the caches only.
    Fetch,
}

/// One caller's interest in a request.
pub struct Action {
    id: u64,
    request: Arc<Request>,
    key: String,
    tag: Option<String>,
    target: TargetKey,
    delivery: Delivery,
    cancelled: AtomicBool,
    will_replay: AtomicBool,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("target", &self.target)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Action {
    /// Creates an action delivering to `target`.
    #[must_use]
    pub fn for_target(request: Arc<Request>, tag: Option<String>, target: Arc<dyn Target>) -> Self {
        let key = TargetKey::of(&target);
        Self::new(request, tag, key, Delivery::Target(target))
    }

    /// Creates an action replying through a oneshot channel.
    #[must_use]
    pub fn for_reply(
        request: Arc<Request>,
        tag: Option<String>,
    ) -> (Self, oneshot::Receiver<LoadResult<LoadedImage>>) {
        let (tx, rx) = oneshot::channel();
        let action = Self::new(
            request,
            tag,
            TargetKey::Detached(0),
            Delivery::Reply(Mutex::new(Some(tx))),
        );
        (action, rx)
    }

    /// Creates a fire-and-forget action.
    #[must_use]
    pub fn for_fetch(request: Arc<Request>, tag: Option<String>) -> Self {
        Self::new(request, tag, TargetKey::Detached(0), Delivery::Fetch)
    }

    fn new(request: Arc<Request>, tag: Option<String>, target: TargetKey, delivery: Delivery) -> Self {
        let id = NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed);
        let target = match target {
            TargetKey::Detached(_) => TargetKey::Detached(id),
            bound @ TargetKey::Target(_) => bound,
        };
        Self {
            id,
            key: request.key(),
            request,
            tag,
            target,
            delivery,
            cancelled: AtomicBool::new(false),
            will_replay: AtomicBool::new(false),
        }
    }

    /// Process-unique action id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The request this action wants.
    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// Request fingerprint.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional grouping tag.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns true if this action carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }

    /// Receiver identity.
    #[must_use]
    pub const fn target(&self) -> TargetKey {
        self.target
    }

    /// Returns true if results go to an external `Target`.
    #[must_use]
    pub const fn is_target_bound(&self) -> bool {
        matches!(self.target, TargetKey::Target(_))
    }

    /// Scheduling priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.request.priority
    }

    /// Memory cache policy.
    #[must_use]
    pub fn memory_policy(&self) -> MemoryPolicy {
        self.request.memory_policy
    }

    /// Network policy.
    #[must_use]
    pub fn network_policy(&self) -> NetworkPolicy {
        self.request.network_policy
    }

    /// Marks the action as cancelled; it will never deliver.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Delivery::Reply(reply) = &self.delivery
            && let Some(tx) = reply.lock().take()
        {
            let _ = tx.send(Err(LoadError::Cancelled));
        }
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Flags that the action waits for a replay after a failure.
    pub fn set_will_replay(&self, value: bool) {
        self.will_replay.store(value, Ordering::SeqCst);
    }

    /// Returns true if the action waits for a replay.
    #[must_use]
    pub fn will_replay(&self) -> bool {
        self.will_replay.load(Ordering::SeqCst)
    }

    /// Notifies the target that work is about to be scheduled.
    pub fn prepare(&self) {
        if let Delivery::Target(target) = &self.delivery {
            target.on_prepare();
        }
    }

    /// Delivers a successful result.
    pub fn complete(&self, image: Arc<DynamicImage>, loaded_from: LoadedFrom) {
        let loaded = LoadedImage {
            key: self.key.clone(),
            image,
            loaded_from,
        };
        match &self.delivery {
            Delivery::Target(target) => target.on_load(loaded),
            Delivery::Reply(reply) => {
                if let Some(tx) = reply.lock().take() {
                    let _ = tx.send(Ok(loaded));
                }
            }
            Delivery::Fetch => {}
        }
    }

    /// Delivers a failure.
    pub fn error(&self, error: LoadError) {
        match &self.delivery {
            Delivery::Target(target) => target.on_error(error),
            Delivery::Reply(reply) => {
                if let Some(tx) = reply.lock().take() {
                    let _ = tx.send(Err(error));
                }
            }
            Delivery::Fetch => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::target_port::mock::{Outcome, RecordingTarget};

    fn request() -> Arc<Request> {
        Arc::new(Request::builder("https://example.com/a.png").build().unwrap())
    }

    #[test]
    fn test_target_key_identity() {
        let a: Arc<dyn Target> = Arc::new(RecordingTarget::new());
        let b: Arc<dyn Target> = Arc::new(RecordingTarget::new());
        assert_eq!(TargetKey::of(&a), TargetKey::of(&a.clone()));
        assert_ne!(TargetKey::of(&a), TargetKey::of(&b));
    }

    #[test]
    fn test_detached_actions_have_distinct_targets() {
        let a = Action::for_fetch(request(), None);
        let b = Action::for_fetch(request(), None);
        assert_ne!(a.target(), b.target());
        assert_eq!(a.target(), TargetKey::Detached(a.id()));
        assert!(!a.is_target_bound());
    }

    #[test]
    fn test_target_delivery() {
        let recorder = Arc::new(RecordingTarget::new());
        let target: Arc<dyn Target> = recorder.clone();
        let action = Action::for_target(request(), Some("gallery".into()), target);

        assert!(action.has_tag("gallery"));
        action.prepare();
        action.complete(Arc::new(DynamicImage::new_rgb8(1, 1)), LoadedFrom::Disk);
        action.error(LoadError::NotCached);

        assert_eq!(recorder.prepared(), 1);
        assert_eq!(
            recorder.outcomes(),
            vec![
                Outcome::Loaded("https://example.com/a.png\n".into(), LoadedFrom::Disk),
                Outcome::Failed(LoadError::NotCached),
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_delivers_once() {
        let (action, rx) = Action::for_reply(request(), None);
        action.complete(Arc::new(DynamicImage::new_rgb8(2, 2)), LoadedFrom::Network);
        action.error(LoadError::NotCached);

        let loaded = rx.await.unwrap().unwrap();
        assert_eq!(loaded.loaded_from, LoadedFrom::Network);
        assert_eq!(loaded.image.width(), 2);
    }

    #[tokio::test]
    async fn test_cancel_replies_cancelled() {
        let (action, rx) = Action::for_reply(request(), None);
        action.cancel();
        assert!(action.is_cancelled());
        assert_eq!(rx.await.unwrap().unwrap_err(), LoadError::Cancelled);
    }
}
