//! The unit of work producing one fingerprint's image.
//!
//! A hunter is created for the first action asking for a fingerprint; later
//! actions for the same fingerprint join it. It loads the source through a
//! request handler, decodes, transforms, and reports the outcome to the
//! dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use image::DynamicImage;
use parking_lot::Mutex;
use tracing::debug;

use crate::application::services::decoder::{self, Decoded};
use crate::application::services::transformer;
use crate::domain::entities::{
    Action, LoadedFrom, MemoryPolicy, NetworkPolicy, Priority, Request,
};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::log::{EventLog, Owner, Verb};
use crate::domain::ports::{MemoryCachePort, Payload, RequestHandler};
use crate::infrastructure::image::GATEWAY_TIMEOUT;

use super::dispatcher::DispatcherHandle;
use super::executor::Job;
use super::stats::Stats;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Collaborators a hunt needs.
pub struct HuntContext {
    /// Memory cache consulted before loading.
    pub cache: Arc<dyn MemoryCachePort>,
    /// Statistics sink.
    pub stats: Arc<Stats>,
    /// Lifecycle event logger.
    pub log: EventLog,
}

/// Image produced by a successful hunt.
pub type HuntOutput = (Arc<DynamicImage>, LoadedFrom);

/// Work for one fingerprint, shared by every action that wants it.
pub struct Hunter {
    sequence: u64,
    key: String,
    request: Arc<Request>,
    memory_policy: MemoryPolicy,
    network_policy: AtomicU8,
    handler: Option<Arc<dyn RequestHandler>>,
    retry_count: AtomicU32,
    priority: AtomicU8,
    actions: Mutex<Vec<Arc<Action>>>,
    cancelled: AtomicBool,
    result: Mutex<Option<LoadResult<HuntOutput>>>,
}

impl std::fmt::Debug for Hunter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hunter")
            .field("sequence", &self.sequence)
            .field("key", &self.key)
            .field("priority", &self.priority())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Hunter {
    /// Creates a hunter for `action`, picking the first handler that accepts its request.
    #[must_use]
    pub fn for_action(action: Arc<Action>, handlers: &[Arc<dyn RequestHandler>]) -> Arc<Self> {
        let hunter = Self::build(action.request().clone(), handlers);
        hunter.priority.store(action.priority() as u8, Ordering::SeqCst);
        hunter.actions.lock().push(action);
        Arc::new(hunter)
    }

    /// Creates a hunter with no attached actions, used for synchronous loads.
    #[must_use]
    pub fn standalone(request: Arc<Request>, handlers: &[Arc<dyn RequestHandler>]) -> Self {
        Self::build(request, handlers)
    }

    fn build(request: Arc<Request>, handlers: &[Arc<dyn RequestHandler>]) -> Self {
        let handler = handlers.iter().find(|h| h.can_handle(&request)).cloned();
        let retry_count = handler.as_ref().map_or(0, |h| h.retry_count());
        Self {
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            key: request.key(),
            memory_policy: request.memory_policy,
            network_policy: AtomicU8::new(request.network_policy.bits()),
            priority: AtomicU8::new(request.priority as u8),
            request,
            handler,
            retry_count: AtomicU32::new(retry_count),
            actions: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    /// Fingerprint this hunter produces.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Request of the action that created the hunter.
    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// Memory policy of the creating request.
    #[must_use]
    pub const fn memory_policy(&self) -> MemoryPolicy {
        self.memory_policy
    }

    /// Network policy for the next attempt.
    #[must_use]
    pub fn network_policy(&self) -> NetworkPolicy {
        NetworkPolicy::from_bits_truncate(self.network_policy.load(Ordering::SeqCst))
    }

    /// Adds flags to the network policy of later attempts.
    pub fn add_network_policy(&self, policy: NetworkPolicy) {
        self.network_policy.fetch_or(policy.bits(), Ordering::SeqCst);
    }

    /// Snapshot of the attached actions.
    #[must_use]
    pub fn actions(&self) -> Vec<Arc<Action>> {
        self.actions.lock().clone()
    }

    /// Joins another action, raising the priority if needed.
    pub fn attach(&self, action: Arc<Action>) {
        self.priority
            .fetch_max(action.priority() as u8, Ordering::SeqCst);
        self.actions.lock().push(action);
    }

    /// Removes an action and recomputes the priority from those left.
    pub fn detach(&self, action: &Arc<Action>) {
        let mut actions = self.actions.lock();
        actions.retain(|a| !Arc::ptr_eq(a, action));
        let priority = actions
            .iter()
            .map(|a| a.priority())
            .max()
            .unwrap_or(Priority::Low);
        self.priority.store(priority as u8, Ordering::SeqCst);
    }

    /// Cancels the hunter if no action is attached. Returns true on success.
    pub fn cancel(&self) -> bool {
        let actions = self.actions.lock();
        if !actions.is_empty() {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Consumes one retry and asks the handler whether to try again.
    pub fn should_retry(&self, airplane_mode: bool, connected: bool) -> bool {
        let Some(handler) = &self.handler else {
            return false;
        };
        let had_retries = self
            .retry_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        had_retries && handler.should_retry(airplane_mode, connected)
    }

    /// Returns true if failed actions may be replayed after reconnecting.
    #[must_use]
    pub fn supports_replay(&self) -> bool {
        self.handler.as_ref().is_some_and(|h| h.supports_replay())
    }

    /// Outcome of the last attempt.
    #[must_use]
    pub fn result(&self) -> Option<LoadResult<HuntOutput>> {
        self.result.lock().clone()
    }

    /// Error of the last attempt, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<LoadError> {
        match &*self.result.lock() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Request ids of the attached actions, for log lines.
    #[must_use]
    pub fn log_ids(&self) -> String {
        let actions = self.actions.lock();
        if actions.is_empty() {
            return self.request.log_id();
        }
        actions
            .iter()
            .map(|a| a.request().log_id())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Runs one attempt on a worker and reports the outcome to the dispatcher.
    pub async fn run(self: Arc<Self>, ctx: Arc<HuntContext>, dispatcher: DispatcherHandle) {
        if self.is_cancelled() {
            return;
        }
        ctx.log.log(Owner::Hunter, Verb::Executing, &self.log_ids());

        let outcome = self.hunt(&ctx).await;

        let retry = matches!(&outcome, Err(e) if e.is_retryable());
        if let Err(e) = &outcome {
            debug!(key = %self.key.escape_debug(), error = %e, retry, "Hunt failed");
        }
        let succeeded = outcome.is_ok();
        *self.result.lock() = Some(outcome);

        if succeeded {
            dispatcher.dispatch_complete(self);
        } else if retry {
            dispatcher.dispatch_retry(self);
        } else {
            dispatcher.dispatch_failed(self);
        }
    }

    /// Produces the image: memory cache, then handler, decode and transform.
    ///
    /// # Errors
    /// Returns the first failure of the pipeline. An offline load that
    /// missed the disk cache is reported as `NotCached`.
    pub async fn hunt(&self, ctx: &HuntContext) -> LoadResult<HuntOutput> {
        if self.memory_policy.should_read_from_memory_cache()
            && let Some(image) = ctx.cache.get(&self.key)
        {
            ctx.stats.cache_hit();
            ctx.log
                .log_with(Owner::Hunter, Verb::Decoded, &self.log_ids(), "from cache");
            return Ok((image, LoadedFrom::Memory));
        }

        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| LoadError::UnrecognizedRequest {
                uri: self.request.uri.clone(),
            })?;

        let policy = if self.retry_count.load(Ordering::SeqCst) == 0 {
            NetworkPolicy::OFFLINE
        } else {
            self.network_policy()
        };

        let output = handler.load(&self.request, policy).await.map_err(|e| {
            if is_offline_miss(&e) {
                LoadError::NotCached
            } else {
                e
            }
        })?;
        let loaded_from = output.loaded_from;

        let decoded = match output.payload {
            Payload::Bytes(bytes) => {
                let request = self.request.clone();
                tokio::task::spawn_blocking(move || decoder::decode(&bytes, &request))
                    .await
                    .map_err(|e| LoadError::decode(format!("decode task failed: {e}")))??
            }
            Payload::Image(image) => Decoded {
                image,
                exif_orientation: 0,
            },
        };
        let exif_orientation = output.exif_orientation.unwrap_or(decoded.exif_orientation);

        ctx.stats.bitmap_decoded(&decoded.image);
        ctx.log.log(Owner::Hunter, Verb::Decoded, &self.log_ids());

        let image = if self.request.needs_transformation() || exif_orientation != 0 {
            let request = self.request.clone();
            let transformed = tokio::task::spawn_blocking(move || {
                transformer::transform(&request, decoded.image, exif_orientation)
            })
            .await
            .map_err(|e| LoadError::decode(format!("transform task failed: {e}")))??;
            ctx.stats.bitmap_transformed(&transformed);
            ctx.log.log(Owner::Hunter, Verb::Transformed, &self.log_ids());
            transformed
        } else {
            decoded.image
        };

        Ok((Arc::new(image), loaded_from))
    }
}

/// An offline-only load that missed the disk cache.
fn is_offline_miss(error: &LoadError) -> bool {
    matches!(error, LoadError::Response { code, policy } if *code == GATEWAY_TIMEOUT && policy.is_offline_only())
}

impl Job for Hunter {
    fn priority(&self) -> Priority {
        Priority::from_u8(self.priority.load(Ordering::SeqCst))
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn is_cancelled(&self) -> bool {
        Self::is_cancelled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use bytes::Bytes;

    use crate::domain::ports::HandlerOutput;
    use crate::domain::ports::mocks::{MockRequestHandler, MockTransformation};
    use crate::infrastructure::image::LruMemoryCache;

    fn context() -> (HuntContext, Arc<LruMemoryCache>) {
        let cache = Arc::new(LruMemoryCache::new(1024 * 1024));
        let ctx = HuntContext {
            cache: cache.clone(),
            stats: Arc::new(Stats::new(cache.clone())),
            log: EventLog::new(true),
        };
        (ctx, cache)
    }

    fn handlers(handler: Arc<MockRequestHandler>) -> Vec<Arc<dyn RequestHandler>> {
        vec![handler as Arc<dyn RequestHandler>]
    }

    fn action(builder: crate::domain::entities::RequestBuilder) -> Arc<Action> {
        Arc::new(Action::for_fetch(Arc::new(builder.build().unwrap()), None))
    }

    fn png(width: u32, height: u32) -> Bytes {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(bytes)
    }

    #[tokio::test]
    async fn test_memory_hit_short_circuits() {
        let (ctx, cache) = context();
        let handler = Arc::new(MockRequestHandler::new());
        let hunter = Hunter::for_action(action(Request::builder("mock:a")), &handlers(handler.clone()));
        cache.set(hunter.key().to_string(), Arc::new(DynamicImage::new_rgb8(1, 1)));

        let (_, from) = hunter.hunt(&ctx).await.unwrap();
        assert_eq!(from, LoadedFrom::Memory);
        assert_eq!(handler.calls(), 0);
        assert_eq!(ctx.stats.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_no_cache_skips_memory_read() {
        let (ctx, cache) = context();
        let handler = Arc::new(MockRequestHandler::new());
        let hunter = Hunter::for_action(
            action(Request::builder("mock:a").memory_policy(MemoryPolicy::NO_CACHE)),
            &handlers(handler.clone()),
        );
        cache.set(hunter.key().to_string(), Arc::new(DynamicImage::new_rgb8(1, 1)));

        let (image, from) = hunter.hunt(&ctx).await.unwrap();
        assert_eq!(from, LoadedFrom::Network);
        assert_eq!((image.width(), image.height()), (8, 8));
        assert_eq!(handler.calls(), 1);
        assert_eq!(ctx.stats.snapshot().cache_hits, 0);
    }

    #[tokio::test]
    async fn test_decodes_and_transforms_bytes() {
        let (ctx, _) = context();
        let handler = Arc::new(MockRequestHandler::new());
        handler.push(Ok(HandlerOutput::bytes(png(40, 20), LoadedFrom::Network)));
        let transformation = Arc::new(MockTransformation::new("mark"));
        let hunter = Hunter::for_action(
            action(
                Request::builder("mock:a")
                    .resize(20, 10)
                    .transform(transformation.clone()),
            ),
            &handlers(handler),
        );

        let (image, from) = hunter.hunt(&ctx).await.unwrap();
        assert_eq!(from, LoadedFrom::Network);
        assert_eq!((image.width(), image.height()), (20, 10));
        assert_eq!(transformation.calls(), 1);

        let snapshot = ctx.stats.snapshot();
        assert_eq!(snapshot.original_bitmap_count, 1);
        assert_eq!(snapshot.transformed_bitmap_count, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_request() {
        let (ctx, _) = context();
        let hunter = Hunter::for_action(action(Request::builder("gopher://x")), &[]);
        let err = hunter.hunt(&ctx).await.unwrap_err();
        assert_eq!(
            err,
            LoadError::UnrecognizedRequest {
                uri: "gopher://x".to_string()
            }
        );
        assert!(!hunter.should_retry(false, true));
    }

    #[tokio::test]
    async fn test_offline_miss_is_not_cached() {
        let (ctx, _) = context();
        let handler = Arc::new(MockRequestHandler::new());
        handler.push(Err(LoadError::Response {
            code: GATEWAY_TIMEOUT,
            policy: NetworkPolicy::OFFLINE,
        }));
        let hunter = Hunter::for_action(action(Request::builder("mock:a")), &handlers(handler));

        let err = hunter.hunt(&ctx).await.unwrap_err();
        assert_eq!(err, LoadError::NotCached);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_attach_and_detach_track_priority() {
        let handler = Arc::new(MockRequestHandler::new());
        let low = action(Request::builder("mock:a").priority(Priority::Low));
        let high = action(Request::builder("mock:a").priority(Priority::High));
        let hunter = Hunter::for_action(low.clone(), &handlers(handler));
        assert_eq!(Job::priority(&*hunter), Priority::Low);

        hunter.attach(high.clone());
        assert_eq!(Job::priority(&*hunter), Priority::High);
        assert!(!hunter.cancel());

        hunter.detach(&high);
        assert_eq!(Job::priority(&*hunter), Priority::Low);
        hunter.detach(&low);
        assert!(hunter.cancel());
        assert!(hunter.is_cancelled());
    }

    #[test]
    fn test_retry_budget() {
        let handler = Arc::new(MockRequestHandler::new().with_retries(1, false));
        let hunter = Hunter::for_action(action(Request::builder("mock:a")), &handlers(handler));
        assert!(hunter.should_retry(false, true));
        assert!(!hunter.should_retry(false, true));
    }

    #[test]
    fn test_retry_refused_when_disconnected() {
        let handler = Arc::new(MockRequestHandler::new().with_retries(2, true));
        let hunter = Hunter::for_action(action(Request::builder("mock:a")), &handlers(handler));
        assert!(!hunter.should_retry(false, false));
        assert!(hunter.supports_replay());
    }
}
