//! Domain entity definitions.

mod action;
mod image;
mod policy;
mod request;
mod stats;

pub use action::{Action, Delivery, TargetKey};
pub use image::{ImageId, LoadedFrom, LoadedImage, image_byte_size};
pub use policy::{MemoryPolicy, NetworkPolicy, Priority};
pub use request::{Gravity, KEY_SEPARATOR, Request, RequestBuilder, Rotation, key_source};
pub use stats::StatsSnapshot;
