//! HSV color thresholding and mask morphology.
//!
//! Converts each RGB pixel to OpenCV's 8-bit HSV scale, keeps pixels whose
//! hue, saturation and value all fall inside the pipeline's bounds, and
//! optionally erodes then dilates the resulting binary mask with a 3×3
//! structuring element via [`imageproc::morphology`].
//!
//! The mask is white (255) where the color matched and black (0)
//! elsewhere, ready for contour extraction.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;

use crate::types::Hsv;

/// Structuring element radius for erode/dilate (radius 1 under L∞ is a
/// 3×3 square).
const MORPHOLOGY_RADIUS: u8 = 1;

/// Convert an RGB pixel to HSV on OpenCV's 8-bit scale.
///
/// Hue is halved into `0..180` so it fits a byte; saturation and value
/// span `0..=255`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names
)]
pub fn rgb_to_hsv(pixel: Rgb<u8>) -> Hsv {
    let [r, g, b] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f64::from(max - min);

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (delta * 255.0 / f64::from(max)).round() as u8
    };

    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let degrees = if delta == 0.0 {
        0.0
    } else if max == pixel.0[0] {
        60.0 * (g - b) / delta
    } else if max == pixel.0[1] {
        60.0f64.mul_add((b - r) / delta, 120.0)
    } else {
        60.0f64.mul_add((r - g) / delta, 240.0)
    };
    let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
    // 360° maps to 180; wrap the top bucket back to red.
    let h = ((degrees / 2.0).round() as u16 % 180) as u8;

    Hsv { h, s, v }
}

/// Binary mask of pixels whose HSV color lies within `[lower, upper]`.
#[must_use = "returns the threshold mask"]
pub fn hsv_mask(frame: &RgbImage, lower: Hsv, upper: Hsv) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        if rgb_to_hsv(*frame.get_pixel(x, y)).within(lower, upper) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Threshold `frame` into a binary mask, then apply the requested
/// morphology. Erosion runs before dilation.
#[must_use = "returns the threshold mask"]
pub fn threshold(frame: &RgbImage, lower: Hsv, upper: Hsv, erode: bool, dilate: bool) -> GrayImage {
    let mut mask = hsv_mask(frame, lower, upper);
    if erode {
        mask = imageproc::morphology::erode(&mask, Norm::LInf, MORPHOLOGY_RADIUS);
    }
    if dilate {
        mask = imageproc::morphology::dilate(&mask, Norm::LInf, MORPHOLOGY_RADIUS);
    }
    mask
}

/// Render a single-channel mask as a 3-channel gray image for streaming.
#[must_use = "returns the rendered mask"]
pub fn mask_to_rgb(mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

/// The image streamed to operators after thresholding: the mask when
/// `is_binary`, otherwise the (orientation-corrected) frame itself.
#[must_use = "returns the display image"]
pub fn display_output(frame: RgbImage, mask: &GrayImage, is_binary: bool) -> RgbImage {
    if is_binary { mask_to_rgb(mask) } else { frame }
}
