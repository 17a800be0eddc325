//! Built-in geometry and custom transformation pipeline.
//!
//! The geometry step is planned up front as a `Geometry` value and then
//! applied to the pixels in a fixed order: crop, scale, EXIF rotation,
//! requested rotation, EXIF flip.

use std::panic::{AssertUnwindSafe, catch_unwind};

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use parking_lot::Mutex;

use crate::domain::entities::{Gravity, Request};
use crate::domain::errors::{LoadError, LoadResult};

/// Serializes every transformation step across workers to bound peak memory.
static TRANSFORM_LOCK: Mutex<()> = Mutex::new(());

/// Quarter-turn rotation implied by an EXIF orientation.
#[must_use]
pub const fn exif_rotation(orientation: u16) -> u32 {
    match orientation {
        5 | 6 => 90,
        3 | 4 => 180,
        7 | 8 => 270,
        _ => 0,
    }
}

/// Returns true if an EXIF orientation mirrors the image horizontally.
#[must_use]
pub const fn exif_flip(orientation: u16) -> bool {
    matches!(orientation, 2 | 4 | 5 | 7)
}

/// Planned geometry for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Source region kept, as `(x, y, width, height)`.
    pub crop: (u32, u32, u32, u32),
    /// Horizontal and vertical scale factors, if resizing applies.
    pub scale: Option<(f32, f32)>,
    /// Quarter-turn rotation from EXIF.
    pub exif_rotation: u32,
    /// Requested rotation in degrees clockwise.
    pub rotation: f32,
    /// Mirror horizontally as the last step.
    pub flip: bool,
}

impl Geometry {
    /// Returns true if applying this geometry leaves the image unchanged.
    #[must_use]
    pub fn is_identity(&self, width: u32, height: u32) -> bool {
        self.crop == (0, 0, width, height)
            && self.scale.is_none()
            && self.exif_rotation == 0
            && self.rotation == 0.0
            && !self.flip
    }
}

/// Computes the geometry for a `width` x `height` image.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn plan(request: &Request, width: u32, height: u32, exif_orientation: u16) -> Geometry {
    let mut geometry = Geometry {
        crop: (0, 0, width, height),
        scale: None,
        exif_rotation: 0,
        rotation: 0.0,
        flip: false,
    };
    if !request.needs_matrix_transform() && exif_orientation == 0 {
        return geometry;
    }

    let mut target_width = request.target_width;
    let mut target_height = request.target_height;

    let degrees = request.rotation.degrees;
    if degrees != 0.0 {
        geometry.rotation = degrees;
        let (w, h) = rotated_extent(target_width as f32, target_height as f32, degrees);
        target_width = w.floor() as u32;
        target_height = h.floor() as u32;
    }

    if exif_orientation != 0 {
        geometry.exif_rotation = exif_rotation(exif_orientation);
        geometry.flip = exif_flip(exif_orientation);
        if geometry.exif_rotation == 90 || geometry.exif_rotation == 270 {
            std::mem::swap(&mut target_width, &mut target_height);
        }
    }

    let (in_w, in_h) = (width as f32, height as f32);
    let (tw, th) = (target_width as f32, target_height as f32);

    if request.center_crop {
        let width_ratio = if target_width != 0 { tw / in_w } else { th / in_h };
        let height_ratio = if target_height != 0 { th / in_h } else { tw / in_w };
        let gravity = request.center_crop_gravity;

        let (scale_x, scale_y);
        if width_ratio > height_ratio {
            let new_size = (in_h * (height_ratio / width_ratio)).ceil() as u32;
            let draw_y = if gravity.contains(Gravity::TOP) {
                0
            } else if gravity.contains(Gravity::BOTTOM) {
                height.saturating_sub(new_size)
            } else {
                height.saturating_sub(new_size) / 2
            };
            geometry.crop = (0, draw_y, width, new_size);
            scale_x = width_ratio;
            scale_y = th / new_size as f32;
        } else if width_ratio < height_ratio {
            let new_size = (in_w * (width_ratio / height_ratio)).ceil() as u32;
            let draw_x = if gravity.contains(Gravity::START) {
                0
            } else if gravity.contains(Gravity::END) {
                width.saturating_sub(new_size)
            } else {
                width.saturating_sub(new_size) / 2
            };
            geometry.crop = (draw_x, 0, new_size, height);
            scale_x = tw / new_size as f32;
            scale_y = height_ratio;
        } else {
            scale_x = height_ratio;
            scale_y = height_ratio;
        }
        if should_resize(request.only_scale_down, width, height, target_width, target_height) {
            geometry.scale = Some((scale_x, scale_y));
        }
    } else if request.center_inside {
        let width_ratio = if target_width != 0 { tw / in_w } else { th / in_h };
        let height_ratio = if target_height != 0 { th / in_h } else { tw / in_w };
        let scale = width_ratio.min(height_ratio);
        if should_resize(request.only_scale_down, width, height, target_width, target_height) {
            geometry.scale = Some((scale, scale));
        }
    } else if (target_width != 0 || target_height != 0)
        && (target_width != width || target_height != height)
    {
        let scale_x = if target_width != 0 { tw / in_w } else { th / in_h };
        let scale_y = if target_height != 0 { th / in_h } else { tw / in_w };
        if should_resize(request.only_scale_down, width, height, target_width, target_height) {
            geometry.scale = Some((scale_x, scale_y));
        }
    }

    geometry
}

/// Returns true unless `only_scale_down` forbids enlarging this source.
#[must_use]
pub const fn should_resize(
    only_scale_down: bool,
    in_width: u32,
    in_height: u32,
    target_width: u32,
    target_height: u32,
) -> bool {
    !only_scale_down
        || (target_width != 0 && in_width > target_width)
        || (target_height != 0 && in_height > target_height)
}

/// Applies a planned geometry to the pixels.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply(image: DynamicImage, geometry: &Geometry) -> DynamicImage {
    if geometry.is_identity(image.width(), image.height()) {
        return image;
    }

    let (x, y, w, h) = geometry.crop;
    let mut result = if (x, y, w, h) == (0, 0, image.width(), image.height()) {
        image
    } else {
        image.crop_imm(x, y, w, h)
    };

    if let Some((scale_x, scale_y)) = geometry.scale {
        let new_w = ((w as f32 * scale_x).round() as u32).max(1);
        let new_h = ((h as f32 * scale_y).round() as u32).max(1);
        if (new_w, new_h) != (result.width(), result.height()) {
            result = result.resize_exact(new_w, new_h, FilterType::Triangle);
        }
    }

    result = match geometry.exif_rotation {
        90 => result.rotate90(),
        180 => result.rotate180(),
        270 => result.rotate270(),
        _ => result,
    };

    if geometry.rotation != 0.0 {
        result = rotate(result, geometry.rotation);
    }

    if geometry.flip {
        result = result.fliph();
    }
    result
}

/// Runs the built-in geometry and then the custom transformations.
///
/// Returns the input untouched when nothing applies. All work happens while
/// holding the process-wide transformation lock.
///
/// # Errors
/// Returns `LoadError::Transformation` if a custom transformation fails or panics.
pub fn transform(request: &Request, image: DynamicImage, exif_orientation: u16) -> LoadResult<DynamicImage> {
    if !request.needs_transformation() && exif_orientation == 0 {
        return Ok(image);
    }

    let _guard = TRANSFORM_LOCK.lock();
    let mut result = image;
    if request.needs_matrix_transform() || exif_orientation != 0 {
        let geometry = plan(request, result.width(), result.height(), exif_orientation);
        result = apply(result, &geometry);
    }
    if request.has_custom_transformations() {
        result = apply_custom_transformations(request, result)?;
    }
    Ok(result)
}

/// Applies the request's custom transformations in order.
///
/// # Errors
/// Returns `LoadError::Transformation` naming the failing transformation.
pub fn apply_custom_transformations(request: &Request, image: DynamicImage) -> LoadResult<DynamicImage> {
    let mut result = image;
    for (index, transformation) in request.transformations.iter().enumerate() {
        let outcome = catch_unwind(AssertUnwindSafe(|| transformation.transform(result)));
        result = match outcome {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                return Err(LoadError::Transformation {
                    key: transformation.key(),
                    index,
                    message: e.to_string(),
                });
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panicked".to_string());
                return Err(LoadError::Transformation {
                    key: transformation.key(),
                    index,
                    message: format!("crashed: {message}"),
                });
            }
        };
    }
    Ok(result)
}

/// Bounding box of a `width` x `height` rectangle rotated by `degrees`.
fn rotated_extent(width: f32, height: f32, degrees: f32) -> (f32, f32) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    (width * cos + height * sin, width * sin + height * cos)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rotate(image: DynamicImage, degrees: f32) -> DynamicImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 90.0 {
        return image.rotate90();
    }
    if normalized == 180.0 {
        return image.rotate180();
    }
    if normalized == 270.0 {
        return image.rotate270();
    }
    if normalized == 0.0 {
        return image;
    }

    let (w, h) = rotated_extent(image.width() as f32, image.height() as f32, degrees);
    let (canvas_w, canvas_h) = ((w.ceil() as u32).max(1), (h.ceil() as u32).max(1));
    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    let offset_x = i64::from(canvas_w.saturating_sub(image.width()) / 2);
    let offset_y = i64::from(canvas_h.saturating_sub(image.height()) / 2);
    imageops::overlay(&mut canvas, &image.to_rgba8(), offset_x, offset_y);

    DynamicImage::ImageRgba8(rotate_about_center(
        &canvas,
        normalized.to_radians(),
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
    ))
}
