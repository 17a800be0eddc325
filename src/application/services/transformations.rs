//! Ready-made custom transformations.

use image::DynamicImage;

use crate::domain::ports::{Transformation, TransformationFailure};

/// Converts the image to grayscale, keeping alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl Transformation for Grayscale {
    fn transform(&self, source: DynamicImage) -> Result<DynamicImage, TransformationFailure> {
        Ok(if source.color().has_alpha() {
            DynamicImage::ImageLumaA8(source.to_luma_alpha8())
        } else {
            DynamicImage::ImageLuma8(source.to_luma8())
        })
    }

    fn key(&self) -> String {
        "grayscale()".to_string()
    }
}

/// Gaussian blur with the given sigma.
#[derive(Debug, Clone, Copy)]
pub struct Blur {
    sigma: f32,
}

impl Blur {
    /// Creates a blur; `sigma` must be positive.
    #[must_use]
    pub const fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl Transformation for Blur {
    fn transform(&self, source: DynamicImage) -> Result<DynamicImage, TransformationFailure> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(format!("blur sigma must be positive, got {}", self.sigma).into());
        }
        Ok(source.blur(self.sigma))
    }

    fn key(&self) -> String {
        format!("blur(sigma={})", self.sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_grayscale_drops_color() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let out = Grayscale.transform(source).unwrap();
        assert!(!out.color().has_color());
        assert_eq!((out.width(), out.height()), (2, 2));
    }

    #[test]
    fn test_grayscale_keeps_alpha() {
        let out = Grayscale.transform(DynamicImage::new_rgba8(1, 1)).unwrap();
        assert!(out.color().has_alpha());
    }

    #[test]
    fn test_blur_keys_differ_by_sigma() {
        assert_ne!(Blur::new(1.0).key(), Blur::new(2.0).key());
    }

    #[test]
    fn test_blur_rejects_non_positive_sigma() {
        assert!(Blur::new(0.0).transform(DynamicImage::new_rgb8(2, 2)).is_err());
        assert!(Blur::new(1.5).transform(DynamicImage::new_rgb8(2, 2)).is_ok());
    }
}
