//! The public entry point.
//!
//! `Picasso` owns the memory cache, the statistics and the dispatcher, and
//! runs a delivery task that hands finished batches to targets and awaiting
//! callers. Requests are described with `RequestCreator`, obtained from
//! `Picasso::load`.

mod builder;
mod request_creator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use image::DynamicImage;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::entities::{Action, LoadedFrom, MemoryPolicy, StatsSnapshot, TargetKey};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::log::{EventLog, Owner, Verb};
use crate::domain::ports::{MemoryCachePort, RequestHandler, Target};
use crate::infrastructure::dispatch::{
    DispatcherHandle, HuntContext, HuntExecutor, HuntOutput, Hunter, MainMessage, NetworkState,
    Stats,
};
use crate::infrastructure::image::DiskImageCache;

pub use builder::PicassoBuilder;
pub use request_creator::RequestCreator;

/// Collaborators assembled by the builder.
struct Parts {
    dispatcher: DispatcherHandle,
    executor: Arc<HuntExecutor>,
    cache: Arc<dyn MemoryCachePort>,
    stats: Arc<Stats>,
    ctx: Arc<HuntContext>,
    handlers: Arc<[Arc<dyn RequestHandler>]>,
    disk_cache: Option<Arc<DiskImageCache>>,
}

struct Inner {
    parts: Parts,
    actions: Mutex<HashMap<TargetKey, Arc<Action>>>,
    shutdown: AtomicBool,
    log: EventLog,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.parts.dispatcher.shutdown();
    }
}

/// Image loader handle. Cheap to clone; all clones share one instance.
#[derive(Clone)]
pub struct Picasso {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Picasso {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picasso")
            .field("pending", &self.inner.actions.lock().len())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl Picasso {
    /// Starts configuring a new instance.
    #[must_use]
    pub fn builder() -> PicassoBuilder {
        PicassoBuilder::new()
    }

    fn start(parts: Parts, main_rx: mpsc::UnboundedReceiver<MainMessage>) -> Self {
        let log = parts.ctx.log;
        let inner = Arc::new(Inner {
            parts,
            actions: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            log,
        });
        tokio::spawn(deliver(Arc::downgrade(&inner), main_rx));
        info!("Image loader started");
        Self { inner }
    }

    /// Starts describing a request for `uri`.
    #[must_use]
    pub fn load(&self, uri: impl Into<String>) -> RequestCreator {
        RequestCreator::new(self.clone(), uri.into())
    }

    /// Cancels the request currently bound to `target`.
    pub fn cancel_request(&self, target: &Arc<dyn Target>) {
        self.cancel_existing(TargetKey::of(target));
    }

    /// Cancels every pending request carrying `tag`.
    pub fn cancel_tag(&self, tag: &str) {
        let keys: Vec<TargetKey> = self
            .inner
            .actions
            .lock()
            .iter()
            .filter(|(_, action)| action.has_tag(tag))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.cancel_existing(key);
        }
    }

    /// Parks every request carrying `tag` until `resume_tag`.
    pub fn pause_tag(&self, tag: impl Into<String>) {
        self.inner.parts.dispatcher.dispatch_pause_tag(tag.into());
    }

    /// Releases requests parked by `pause_tag`.
    pub fn resume_tag(&self, tag: impl Into<String>) {
        self.inner.parts.dispatcher.dispatch_resume_tag(tag.into());
    }

    /// Drops every memory cache entry loaded from `uri`.
    pub fn invalidate(&self, uri: &str) {
        self.inner.parts.cache.clear_key_uri(uri);
    }

    /// Current statistics.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.parts.stats.snapshot()
    }

    /// Disk cache used by the default downloader, if any.
    #[must_use]
    pub fn disk_cache(&self) -> Option<&Arc<DiskImageCache>> {
        self.inner.parts.disk_cache.as_ref()
    }

    /// Reports a connectivity change. Failed requests are replayed on reconnect.
    pub fn set_network_state(&self, state: NetworkState) {
        self.inner
            .parts
            .dispatcher
            .dispatch_network_state_change(state);
    }

    /// Reports an airplane mode change.
    pub fn set_airplane_mode(&self, enabled: bool) {
        self.inner
            .parts
            .dispatcher
            .dispatch_airplane_mode_change(enabled);
    }

    /// Stops the instance. Pending requests fail with `ShutDown`, the memory
    /// cache is cleared and later loads fail immediately. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.parts.cache.clear();

        let pending: Vec<Arc<Action>> = self
            .inner
            .actions
            .lock()
            .drain()
            .map(|(_, action)| action)
            .collect();
        for action in pending {
            action.error(LoadError::ShutDown);
            action.cancel();
        }

        self.inner.parts.dispatcher.shutdown();
        info!("Image loader shut down");
    }

    /// Returns true after `shutdown`.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Looks the key up in the memory cache when the policy allows it, counting the hit or miss.
    fn quick_memory_cache_check(&self, key: &str, policy: MemoryPolicy) -> Option<Arc<DynamicImage>> {
        if !policy.should_read_from_memory_cache() {
            return None;
        }
        let cached = self.inner.parts.cache.get(key);
        if cached.is_some() {
            self.inner.parts.stats.cache_hit();
        } else {
            self.inner.parts.stats.cache_miss();
        }
        cached
    }

    /// Registers the action for its target, replacing the target's previous request, and submits it.
    ///
    /// The shutdown flag is read under the action map lock, so an action is
    /// either drained by `shutdown` or failed here, never stranded.
    fn enqueue_and_submit(&self, action: Arc<Action>) {
        let mut actions = self.inner.actions.lock();
        if self.inner.shutdown.load(Ordering::SeqCst) {
            drop(actions);
            action.error(LoadError::ShutDown);
            action.cancel();
            return;
        }
        let previous = actions.insert(action.target(), action.clone());
        drop(actions);
        if let Some(previous) = previous
            && !Arc::ptr_eq(&previous, &action)
        {
            previous.cancel();
            self.inner.parts.dispatcher.dispatch_cancel(previous);
        }
        self.inner.parts.dispatcher.dispatch_submit(action);
    }

    fn cancel_existing(&self, key: TargetKey) {
        let removed = self.inner.actions.lock().remove(&key);
        if let Some(action) = removed {
            action.cancel();
            self.inner.parts.dispatcher.dispatch_cancel(action.clone());
            self.inner
                .log
                .log_with(Owner::Main, Verb::Canceled, &action.request().log_id(), "by caller");
        }
    }

    fn hunt_context(&self) -> &HuntContext {
        &self.inner.parts.ctx
    }

    fn handlers(&self) -> &[Arc<dyn RequestHandler>] {
        &self.inner.parts.handlers
    }

    /// Current number of workers.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.parts.executor.thread_count()
    }
}

impl Inner {
    fn deliver_batch(&self, hunters: Vec<Arc<Hunter>>) {
        for hunter in hunters {
            let Some(result) = hunter.result() else {
                continue;
            };
            for action in hunter.actions() {
                self.deliver_action(&action, &result);
            }
        }
    }

    fn deliver_action(&self, action: &Arc<Action>, result: &LoadResult<HuntOutput>) {
        if action.is_cancelled() {
            return;
        }
        if !action.will_replay() {
            let mut actions = self.actions.lock();
            if actions
                .get(&action.target())
                .is_some_and(|current| Arc::ptr_eq(current, action))
            {
                actions.remove(&action.target());
            }
        }

        let ids = action.request().log_id();
        match result {
            Ok((image, loaded_from)) => {
                action.complete(image.clone(), *loaded_from);
                self.log
                    .log_with(Owner::Main, Verb::Completed, &ids, &format!("from {loaded_from}"));
            }
            Err(error) => {
                action.error(error.clone());
                self.log
                    .log_with(Owner::Main, Verb::Errored, &ids, &error.to_string());
            }
        }
    }

    fn resume(&self, picasso: &Picasso, actions: Vec<Arc<Action>>) {
        for action in actions {
            if let Some(image) =
                picasso.quick_memory_cache_check(action.key(), action.memory_policy())
            {
                self.deliver_action(&action, &Ok((image, LoadedFrom::Memory)));
                self.log.log_with(
                    Owner::Main,
                    Verb::Resumed,
                    &action.request().log_id(),
                    "from memory",
                );
            } else {
                self.log
                    .log(Owner::Main, Verb::Resumed, &action.request().log_id());
                picasso.enqueue_and_submit(action);
            }
        }
    }
}

async fn deliver(inner: Weak<Inner>, mut main_rx: mpsc::UnboundedReceiver<MainMessage>) {
    while let Some(message) = main_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.shutdown.load(Ordering::SeqCst) {
            continue;
        }
        match message {
            MainMessage::Batch(hunters) => inner.deliver_batch(hunters),
            MainMessage::Resume(actions) => {
                let picasso = Picasso { inner };
                picasso.inner.resume(&picasso, actions);
            }
        }
    }
    debug!("Delivery task stopped");
}

#[cfg(test)]
mod tests;
