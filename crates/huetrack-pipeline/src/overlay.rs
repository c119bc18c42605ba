//! Target overlay drawn on the streamed display image.
//!
//! Purely cosmetic: the published angles never depend on it.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

use crate::types::{Point, Region};

/// Overlay color.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels.
const THICKNESS: i8 = 3;

/// Center marker radius in pixels.
const MARKER_RADIUS: i32 = 3;

/// Draw the rotated rectangle outline and a center marker for `target`.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_target(display: &mut RgbImage, target: &Region) {
    let corners = target.corners();
    for (i, &a) in corners.iter().enumerate() {
        let b = corners[(i + 1) % corners.len()];
        draw_thick_segment(display, a, b);
    }
    let center = (
        target.center.x.round() as i32,
        target.center.y.round() as i32,
    );
    draw_hollow_circle_mut(display, center, MARKER_RADIUS, OVERLAY_COLOR);
}

/// A segment widened by drawing parallel copies offset along its normal.
#[allow(clippy::cast_possible_truncation)]
fn draw_thick_segment(display: &mut RgbImage, a: Point, b: Point) {
    let length = a.distance(b);
    let (nx, ny) = if length > 0.0 {
        ((a.y - b.y) / length, (b.x - a.x) / length)
    } else {
        (0.0, 0.0)
    };
    let half = THICKNESS / 2;
    for offset in -half..=half {
        let o = f64::from(offset);
        let start = ((a.x + nx * o) as f32, (a.y + ny * o) as f32);
        let end = ((b.x + nx * o) as f32, (b.y + ny * o) as f32);
        draw_line_segment_mut(display, start, end, OVERLAY_COLOR);
    }
}
