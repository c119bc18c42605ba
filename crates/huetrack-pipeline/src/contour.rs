//! Shape extraction: locate contour candidates in a binary threshold mask.
//!
//! This module defines the [`ShapeExtractor`] trait for pluggable
//! extraction algorithms and the [`ShapeExtractorKind`] enum for selecting
//! which algorithm to use at runtime. Each extracted [`Candidate`] carries
//! its boundary points plus the measurements the geometric filter needs.

use image::GrayImage;
use imageproc::contours::{BorderType, Contour};
use imageproc::geometry::contour_area;
use serde::{Deserialize, Serialize};

use crate::geometry::{Pixel, bounding_region, pixel_point};
use crate::types::{Point, Region};

/// One contour found in the mask, with its derived measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Boundary points in pixel coordinates.
    pub pixels: Vec<Pixel>,
    /// Enclosed polygon area in square pixels.
    pub area: f64,
    /// Minimum-area bounding rectangle.
    pub rect: Region,
}

impl Candidate {
    /// Build a candidate from boundary pixels, computing its area and
    /// bounding rectangle.
    #[must_use]
    pub fn from_pixels(pixels: Vec<Pixel>) -> Self {
        let area = contour_area(&pixels);
        let rect = bounding_region(&pixels);
        Self { pixels, area, rect }
    }

    /// Boundary points as floating-point coordinates.
    #[must_use]
    pub fn points(&self) -> Vec<Point> {
        self.pixels.iter().copied().map(pixel_point).collect()
    }

    /// Contour area as a percentage of its bounding-rectangle area.
    #[must_use]
    pub fn extent(&self) -> f64 {
        let rect_area = self.rect.area();
        if rect_area <= 0.0 {
            0.0
        } else {
            self.area / rect_area * 100.0
        }
    }
}

/// Selects which shape extraction algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapeExtractorKind {
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`,
    /// keeping outer borders only so holes inside a blob are not reported
    /// as separate shapes.
    #[default]
    OuterBorders,
}

/// Trait for shape extraction strategies.
///
/// Input: a binary mask (white = matched color).
/// Output: one candidate per detected shape; empty when nothing matched.
pub trait ShapeExtractor {
    /// Extract contour candidates from the mask.
    fn extract(&self, mask: &GrayImage) -> Vec<Candidate>;
}

impl ShapeExtractor for ShapeExtractorKind {
    fn extract(&self, mask: &GrayImage) -> Vec<Candidate> {
        match *self {
            Self::OuterBorders => extract_outer_borders(mask),
        }
    }
}

/// Outer borders from `imageproc`.
///
/// Contours with fewer than three points enclose no area and are dropped.
fn extract_outer_borders(mask: &GrayImage) -> Vec<Candidate> {
    let contours: Vec<Contour<i32>> = imageproc::contours::find_contours(mask);

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 3)
        .map(|c| Candidate::from_pixels(c.points))
        .collect()
}
