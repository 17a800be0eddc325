//! Fluent request description with its terminal operations.

use std::sync::Arc;

use crate::domain::entities::{
    Action, Gravity, LoadedFrom, LoadedImage, MemoryPolicy, NetworkPolicy, Priority, Request,
    RequestBuilder,
};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::log::{Owner, Verb};
use crate::domain::ports::{Target, Transformation};
use crate::infrastructure::dispatch::Hunter;

use super::Picasso;

/// Describes one request. Created by `Picasso::load` and consumed by
/// `fetch`, `load`, `get` or `into`.
#[must_use = "a request does nothing until fetch, load, get or into is called"]
pub struct RequestCreator {
    picasso: Picasso,
    builder: RequestBuilder,
    tag: Option<String>,
}

impl std::fmt::Debug for RequestCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCreator")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl RequestCreator {
    pub(super) fn new(picasso: Picasso, uri: String) -> Self {
        Self {
            picasso,
            builder: Request::builder(uri),
            tag: None,
        }
    }

    /// Resizes to the given bounds. A zero side keeps the aspect ratio.
    pub fn resize(mut self, width: i64, height: i64) -> Self {
        self.builder = self.builder.resize(width, height);
        self
    }

    /// Crops evenly to fill the resize bounds.
    pub fn center_crop(self) -> Self {
        self.center_crop_with(Gravity::CENTER)
    }

    /// Crops to fill the resize bounds, keeping the edges named by `gravity`.
    pub fn center_crop_with(mut self, gravity: Gravity) -> Self {
        self.builder = self.builder.center_crop(gravity);
        self
    }

    /// Scales to fit inside the resize bounds.
    pub fn center_inside(mut self) -> Self {
        self.builder = self.builder.center_inside();
        self
    }

    /// Never upscales.
    pub fn only_scale_down(mut self) -> Self {
        self.builder = self.builder.only_scale_down();
        self
    }

    /// Rotates clockwise.
    pub fn rotate(mut self, degrees: f32) -> Self {
        self.builder = self.builder.rotate(degrees);
        self
    }

    /// Rotates clockwise about a pivot.
    pub fn rotate_about(mut self, degrees: f32, pivot_x: f32, pivot_y: f32) -> Self {
        self.builder = self.builder.rotate_about(degrees, pivot_x, pivot_y);
        self
    }

    /// Appends a custom transformation.
    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.builder = self.builder.transform(transformation);
        self
    }

    /// Uses `key` instead of the URI as cache identity.
    pub fn stable_key(mut self, key: impl Into<String>) -> Self {
        self.builder = self.builder.stable_key(key);
        self
    }

    /// Sets the scheduling priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.builder = self.builder.priority(priority);
        self
    }

    /// Groups the request under `tag` for pause, resume and cancel.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the memory cache policy.
    pub fn memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.builder = self.builder.memory_policy(policy);
        self
    }

    /// Sets the disk cache and network policy.
    pub fn network_policy(mut self, policy: NetworkPolicy) -> Self {
        self.builder = self.builder.network_policy(policy);
        self
    }

    /// Warms the caches without delivering anything. Runs at low priority unless one was set.
    ///
    /// # Errors
    /// Returns error if the request is invalid or the instance is shut down.
    pub fn fetch(self) -> LoadResult<()> {
        let builder = if self.builder.has_priority() {
            self.builder
        } else {
            self.builder.priority(Priority::Low)
        };
        let request = Arc::new(builder.build()?);
        if self.picasso.is_shutdown() {
            return Err(LoadError::ShutDown);
        }

        let log = self.picasso.inner.log;
        log.log(Owner::Main, Verb::Created, &request.log_id());
        if self
            .picasso
            .quick_memory_cache_check(&request.key(), request.memory_policy)
            .is_some()
        {
            log.log_with(Owner::Main, Verb::Completed, &request.log_id(), "from memory");
            return Ok(());
        }

        let action = Arc::new(Action::for_fetch(request, self.tag));
        self.picasso.enqueue_and_submit(action);
        Ok(())
    }

    /// Loads through the dispatcher and waits for the result.
    ///
    /// # Errors
    /// Returns the load failure, `Cancelled` if the request was cancelled,
    /// or `ShutDown` if the instance stopped first.
    pub async fn load(self) -> LoadResult<LoadedImage> {
        let request = Arc::new(self.builder.build()?);
        if self.picasso.is_shutdown() {
            return Err(LoadError::ShutDown);
        }

        let log = self.picasso.inner.log;
        log.log(Owner::Main, Verb::Created, &request.log_id());
        let key = request.key();
        if let Some(image) = self
            .picasso
            .quick_memory_cache_check(&key, request.memory_policy)
        {
            log.log_with(Owner::Main, Verb::Completed, &request.log_id(), "from memory");
            return Ok(LoadedImage {
                key,
                image,
                loaded_from: LoadedFrom::Memory,
            });
        }

        let (action, reply) = Action::for_reply(request, self.tag);
        self.picasso.enqueue_and_submit(Arc::new(action));
        reply.await.map_err(|_| LoadError::ShutDown)?
    }

    /// Runs the whole pipeline on the calling task, bypassing the dispatcher.
    /// The result is not stored in the memory cache.
    ///
    /// # Errors
    /// Returns the first failure of the pipeline.
    pub async fn get(self) -> LoadResult<LoadedImage> {
        let request = Arc::new(self.builder.build()?);
        if self.picasso.is_shutdown() {
            return Err(LoadError::ShutDown);
        }

        let key = request.key();
        let hunter = Hunter::standalone(request, self.picasso.handlers());
        let (image, loaded_from) = hunter.hunt(self.picasso.hunt_context()).await?;
        Ok(LoadedImage {
            key,
            image,
            loaded_from,
        })
    }

    /// Loads into `target`, replacing any request the target had pending.
    ///
    /// Memory cache hits are delivered synchronously; otherwise the target's
    /// `on_prepare` runs before the work is submitted.
    pub fn into(self, target: Arc<dyn Target>) {
        let request = match self.builder.build() {
            Ok(request) => Arc::new(request),
            Err(error) => {
                self.picasso.cancel_request(&target);
                target.on_error(error);
                return;
            }
        };
        if self.picasso.is_shutdown() {
            target.on_error(LoadError::ShutDown);
            return;
        }

        let log = self.picasso.inner.log;
        log.log(Owner::Main, Verb::Created, &request.log_id());
        let key = request.key();
        if let Some(image) = self
            .picasso
            .quick_memory_cache_check(&key, request.memory_policy)
        {
            self.picasso.cancel_request(&target);
            log.log_with(Owner::Main, Verb::Completed, &request.log_id(), "from memory");
            target.on_load(LoadedImage {
                key,
                image,
                loaded_from: LoadedFrom::Memory,
            });
            return;
        }

        let action = Arc::new(Action::for_target(request, self.tag, target));
        action.prepare();
        self.picasso.enqueue_and_submit(action);
    }
}
