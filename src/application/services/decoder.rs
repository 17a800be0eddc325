//! Turns encoded bytes into images.

use std::io::Cursor;

use image::DynamicImage;
use tracing::trace;

use crate::domain::entities::Request;
use crate::domain::errors::{LoadError, LoadResult};

/// A decoded image together with its EXIF orientation.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// The pixels, possibly subsampled.
    pub image: DynamicImage,
    /// EXIF orientation (1-8), 0 when unknown.
    pub exif_orientation: u16,
}

/// Reads the EXIF orientation tag from an encoded image.
///
/// Returns `None` when the container has no EXIF block or the value is out of range.
#[must_use]
pub fn exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .and_then(|v| u16::try_from(v).ok())
        .filter(|v| (1..=8).contains(v))
}

/// Computes the integer subsampling factor for a target size.
///
/// A zero target dimension keeps the aspect ratio and is ignored. When both
/// dimensions are given, center-inside keeps the larger ratio so the result
/// still covers the bounds; everything else keeps the smaller one.
#[must_use]
pub fn calculate_in_sample_size(
    req_width: u32,
    req_height: u32,
    width: u32,
    height: u32,
    center_inside: bool,
) -> u32 {
    if !(height > req_height || width > req_width) {
        return 1;
    }
    let sample = if req_height == 0 {
        width.checked_div(req_width).unwrap_or(1)
    } else if req_width == 0 {
        height / req_height
    } else {
        let height_ratio = height / req_height;
        let width_ratio = width / req_width;
        if center_inside {
            height_ratio.max(width_ratio)
        } else {
            height_ratio.min(width_ratio)
        }
    };
    sample.max(1)
}

/// Decodes `bytes`, subsampling when the request carries a target size.
///
/// # Errors
/// Returns `LoadError::Decode` if the bytes are not a supported image.
pub fn decode(bytes: &[u8], request: &Request) -> LoadResult<Decoded> {
    let exif_orientation = exif_orientation(bytes).unwrap_or(0);

    let image = image::load_from_memory(bytes).map_err(|e| {
        let format = image::guess_format(bytes)
            .map_or_else(|_| "unknown format".to_string(), |f| format!("{f:?}"));
        LoadError::decode(format!("failed to decode {format}: {e}"))
    })?;

    let image = if request.has_size() {
        subsample(image, request)
    } else {
        image
    };

    Ok(Decoded {
        image,
        exif_orientation,
    })
}

fn subsample(image: DynamicImage, request: &Request) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let sample = calculate_in_sample_size(
        request.target_width,
        request.target_height,
        width,
        height,
        request.center_inside,
    );
    if sample <= 1 {
        return image;
    }
    let sampled_width = (width / sample).max(1);
    let sampled_height = (height / sample).max(1);
    trace!(
        sample,
        from = %format!("{width}x{height}"),
        to = %format!("{sampled_width}x{sampled_height}"),
        "Subsampling decoded image"
    );
    image.thumbnail_exact(sampled_width, sampled_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test_case(100, 100, 50, 50, false, 1 ; "smaller_than_target")]
    #[test_case(100, 0, 400, 300, false, 4 ; "width_only")]
    #[test_case(0, 100, 400, 300, false, 3 ; "height_only")]
    #[test_case(100, 100, 400, 250, false, 2 ; "min_ratio")]
    #[test_case(100, 100, 400, 250, true, 4 ; "center_inside_max_ratio")]
    #[test_case(500, 0, 400, 300, false, 1 ; "never_zero")]
    fn test_sample_size(rw: u32, rh: u32, w: u32, h: u32, inside: bool, expected: u32) {
        assert_eq!(calculate_in_sample_size(rw, rh, w, h, inside), expected);
    }

    #[test]
    fn test_decode_without_size_keeps_dimensions() {
        let request = Request::builder("file:///a.png").build().unwrap();
        let decoded = decode(&encode_png(40, 20), &request).unwrap();
        assert_eq!((decoded.image.width(), decoded.image.height()), (40, 20));
        assert_eq!(decoded.exif_orientation, 0);
    }

    #[test]
    fn test_decode_subsamples_to_target() {
        let request = Request::builder("file:///a.png")
            .resize(10, 10)
            .build()
            .unwrap();
        let decoded = decode(&encode_png(40, 20), &request).unwrap();
        assert_eq!((decoded.image.width(), decoded.image.height()), (20, 10));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let request = Request::builder("file:///a.png").build().unwrap();
        let err = decode(b"definitely not an image", &request).unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)));
    }

    #[test]
    fn test_png_without_exif_has_no_orientation() {
        assert_eq!(exif_orientation(&encode_png(2, 2)), None);
    }
}
