//! Geometric filtering of contour candidates.
//!
//! A candidate survives only if all three measurements fall inside the
//! pipeline's inclusive ranges:
//!
//! - **area**: contour area as a percentage of the frame area
//! - **ratio**: bounding-rectangle width / height
//! - **extent**: contour area as a percentage of the bounding-rectangle area

use crate::contour::Candidate;
use crate::types::{Dimensions, Range};

/// Contour area as a percentage of the frame area.
#[must_use]
pub fn area_percent(candidate: &Candidate, frame: Dimensions) -> f64 {
    let frame_area = frame.area();
    if frame_area <= 0.0 {
        0.0
    } else {
        candidate.area / frame_area * 100.0
    }
}

/// Keep the candidates whose area, ratio and extent all lie in range.
///
/// Order is preserved.
#[must_use = "returns the surviving candidates"]
pub fn filter_shapes(
    candidates: Vec<Candidate>,
    area: Range,
    ratio: Range,
    extent: Range,
    frame: Dimensions,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            area.contains(area_percent(c, frame))
                && ratio.contains(c.rect.aspect_ratio())
                && extent.contains(c.extent())
        })
        .collect()
}
