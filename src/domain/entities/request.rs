//! Immutable description of a single image load.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use super::policy::{MemoryPolicy, NetworkPolicy, Priority};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::Transformation;

/// Separator between the segments of a request fingerprint.
pub const KEY_SEPARATOR: char = '\n';

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

bitflags! {
    /// Anchor used by center-crop when cutting the excess of one axis.
    ///
    /// An empty set crops evenly from both sides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Gravity: u8 {
        /// Keep the top edge.
        const TOP = 1 << 0;
        /// Keep the bottom edge.
        const BOTTOM = 1 << 1;
        /// Keep the leading (left) edge.
        const START = 1 << 2;
        /// Keep the trailing (right) edge.
        const END = 1 << 3;
    }
}

impl Gravity {
    /// Centered cropping.
    pub const CENTER: Self = Self::empty();
}

/// Rotation requested by the caller, in degrees clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    /// Angle in degrees.
    pub degrees: f32,
    /// Optional pivot point.
    pub pivot: Option<(f32, f32)>,
}

/// A validated image request.
#[derive(Clone)]
pub struct Request {
    /// Process-unique id used in log lines.
    pub id: u64,
    /// Source URI.
    pub uri: String,
    /// Overrides the URI as the cache identity when set.
    pub stable_key: Option<String>,
    /// Target width, 0 when unspecified.
    pub target_width: u32,
    /// Target height, 0 when unspecified.
    pub target_height: u32,
    /// Crop to fill the target bounds.
    pub center_crop: bool,
    /// Anchor for center-crop.
    pub center_crop_gravity: Gravity,
    /// Scale to fit inside the target bounds.
    pub center_inside: bool,
    /// Never upscale.
    pub only_scale_down: bool,
    /// Requested rotation.
    pub rotation: Rotation,
    /// Ordered custom transformations.
    pub transformations: Vec<Arc<dyn Transformation>>,
    /// Scheduling priority.
    pub priority: Priority,
    /// Memory cache policy.
    pub memory_policy: MemoryPolicy,
    /// Disk cache / network policy.
    pub network_policy: NetworkPolicy,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transformations: Vec<String> = self.transformations.iter().map(|t| t.key()).collect();
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("stable_key", &self.stable_key)
            .field("target_width", &self.target_width)
            .field("target_height", &self.target_height)
            .field("center_crop", &self.center_crop)
            .field("center_inside", &self.center_inside)
            .field("only_scale_down", &self.only_scale_down)
            .field("rotation", &self.rotation)
            .field("transformations", &transformations)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Starts building a request for the given URI.
    #[must_use]
    pub fn builder(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri)
    }

    /// Short identifier for log lines.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("[R{}]", self.id)
    }

    /// Human readable name of the source, used in spans.
    #[must_use]
    pub fn name(&self) -> &str {
        self.uri.rsplit('/').find(|s| !s.is_empty()).unwrap_or(&self.uri)
    }

    /// Returns true if a target size was requested.
    #[must_use]
    pub const fn has_size(&self) -> bool {
        self.target_width != 0 || self.target_height != 0
    }

    /// Returns true if the built-in geometry step has work to do.
    #[must_use]
    pub fn needs_matrix_transform(&self) -> bool {
        self.has_size() || self.rotation.degrees != 0.0
    }

    /// Returns true if custom transformations are attached.
    #[must_use]
    pub fn has_custom_transformations(&self) -> bool {
        !self.transformations.is_empty()
    }

    /// Returns true if any transformation step applies.
    #[must_use]
    pub fn needs_transformation(&self) -> bool {
        self.needs_matrix_transform() || self.has_custom_transformations()
    }

    /// Builds the fingerprint identifying this request's output.
    #[must_use]
    pub fn key(&self) -> String {
        let source = self.stable_key.as_deref().unwrap_or(&self.uri);
        let mut key = String::with_capacity(source.len() + 50);
        key.push_str(source);
        key.push(KEY_SEPARATOR);

        if self.rotation.degrees != 0.0 {
            // degrees and pivots always carry a fractional part, e.g. `90.0`
            let _ = write!(key, "rotation:{:?}", self.rotation.degrees);
            if let Some((x, y)) = self.rotation.pivot {
                let _ = write!(key, "@{x:?}x{y:?}");
            }
            key.push(KEY_SEPARATOR);
        }
        if self.has_size() {
            let _ = write!(key, "resize:{}x{}", self.target_width, self.target_height);
            key.push(KEY_SEPARATOR);
        }
        if self.center_crop {
            let _ = write!(key, "centerCrop:{}", self.center_crop_gravity.bits());
            key.push(KEY_SEPARATOR);
        } else if self.center_inside {
            key.push_str("centerInside");
            key.push(KEY_SEPARATOR);
        }

        for transformation in &self.transformations {
            key.push_str(&transformation.key());
            key.push(KEY_SEPARATOR);
        }

        key
    }
}

/// Builder validating request options.
#[derive(Clone)]
pub struct RequestBuilder {
    uri: String,
    stable_key: Option<String>,
    target_width: u32,
    target_height: u32,
    resize_error: Option<String>,
    center_crop: bool,
    center_crop_gravity: Gravity,
    center_inside: bool,
    only_scale_down: bool,
    rotation: Rotation,
    transformations: Vec<Arc<dyn Transformation>>,
    priority: Option<Priority>,
    memory_policy: MemoryPolicy,
    network_policy: NetworkPolicy,
}

impl RequestBuilder {
    /// Creates a builder for the given source URI.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stable_key: None,
            target_width: 0,
            target_height: 0,
            resize_error: None,
            center_crop: false,
            center_crop_gravity: Gravity::CENTER,
            center_inside: false,
            only_scale_down: false,
            rotation: Rotation::default(),
            transformations: Vec::new(),
            priority: None,
            memory_policy: MemoryPolicy::empty(),
            network_policy: NetworkPolicy::empty(),
        }
    }

    /// Resizes to the given dimensions; 0 keeps the aspect ratio on that axis.
    #[must_use]
    pub fn resize(mut self, width: i64, height: i64) -> Self {
        if width < 0 {
            self.resize_error = Some("Width must be positive number or 0.".to_string());
        } else if height < 0 {
            self.resize_error = Some("Height must be positive number or 0.".to_string());
        } else if width == 0 && height == 0 {
            self.resize_error = Some("At least one dimension has to be positive number.".to_string());
        } else {
            self.resize_error = None;
            self.target_width = u32::try_from(width).unwrap_or(u32::MAX);
            self.target_height = u32::try_from(height).unwrap_or(u32::MAX);
        }
        self
    }

    /// Crops to fill the target bounds, anchored by `gravity`.
    #[must_use]
    pub const fn center_crop(mut self, gravity: Gravity) -> Self {
        self.center_crop = true;
        self.center_crop_gravity = gravity;
        self
    }

    /// Scales to fit inside the target bounds.
    #[must_use]
    pub const fn center_inside(mut self) -> Self {
        self.center_inside = true;
        self
    }

    /// Only resize when the source is larger than the target.
    #[must_use]
    pub const fn only_scale_down(mut self) -> Self {
        self.only_scale_down = true;
        self
    }

    /// Rotates by `degrees`.
    #[must_use]
    pub const fn rotate(mut self, degrees: f32) -> Self {
        self.rotation = Rotation {
            degrees,
            pivot: None,
        };
        self
    }

    /// Rotates by `degrees` around a pivot point.
    #[must_use]
    pub const fn rotate_about(mut self, degrees: f32, pivot_x: f32, pivot_y: f32) -> Self {
        self.rotation = Rotation {
            degrees,
            pivot: Some((pivot_x, pivot_y)),
        };
        self
    }

    /// Appends a custom transformation.
    #[must_use]
    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Uses `key` instead of the URI as cache identity.
    #[must_use]
    pub fn stable_key(mut self, key: impl Into<String>) -> Self {
        self.stable_key = Some(key.into());
        self
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Returns true if a priority was set explicitly.
    #[must_use]
    pub const fn has_priority(&self) -> bool {
        self.priority.is_some()
    }

    /// Adds memory policy flags.
    #[must_use]
    pub fn memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy |= policy;
        self
    }

    /// Adds network policy flags.
    #[must_use]
    pub fn network_policy(mut self, policy: NetworkPolicy) -> Self {
        self.network_policy |= policy;
        self
    }

    /// Returns true if a source and a size are known.
    #[must_use]
    pub const fn has_size(&self) -> bool {
        self.target_width != 0 || self.target_height != 0
    }

    /// Validates options and assigns a fresh request id.
    ///
    /// # Errors
    /// Returns `LoadError::InvalidRequest` on empty URIs or contradictory options.
    pub fn build(self) -> LoadResult<Request> {
        if self.uri.trim().is_empty() {
            return Err(LoadError::invalid("Path must not be empty."));
        }
        if let Some(message) = self.resize_error {
            return Err(LoadError::InvalidRequest(message));
        }
        if self.center_inside && self.center_crop {
            return Err(LoadError::invalid(
                "Center crop and center inside can not be used together.",
            ));
        }
        if self.center_crop && !self.has_size() {
            return Err(LoadError::invalid(
                "Center crop requires calling resize with positive width and height.",
            ));
        }
        if self.center_inside && !self.has_size() {
            return Err(LoadError::invalid(
                "Center inside requires calling resize with positive width and height.",
            ));
        }
        if self.only_scale_down && !self.has_size() {
            return Err(LoadError::invalid(
                "Only scale down requires calling resize with positive width and height.",
            ));
        }

        Ok(Request {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            uri: self.uri,
            stable_key: self.stable_key,
            target_width: self.target_width,
            target_height: self.target_height,
            center_crop: self.center_crop,
            center_crop_gravity: self.center_crop_gravity,
            center_inside: self.center_inside,
            only_scale_down: self.only_scale_down,
            rotation: self.rotation,
            transformations: self.transformations,
            priority: self.priority.unwrap_or_default(),
            memory_policy: self.memory_policy,
            network_policy: self.network_policy,
        })
    }
}

/// Returns the source part of a fingerprint.
#[must_use]
pub fn key_source(key: &str) -> &str {
    key.split(KEY_SEPARATOR).next().unwrap_or(key)
}
