//! The vision-algorithm operations the per-frame stage chain calls.
//!
//! [`StageRunner`] is the seam between orchestration and pixel work: five
//! pure operations with no state carried between calls.
//! [`DefaultStageRunner`] implements them with `image` + `imageproc`
//! through the modules of this crate.

use image::RgbImage;

use crate::contour::{Candidate, ShapeExtractor, ShapeExtractorKind};
use crate::group::{GroupPolicy, Grouping, IntersectionPolicy, TargetGrouper};
use crate::sort::{SortMode, TargetSelector};
use crate::types::{Dimensions, GrayImage, Hsv, Orientation, Range, Region};

/// Vision-algorithm operations consumed by the stage chain.
///
/// Implementations must be pure: the same inputs always give the same
/// outputs and nothing is retained between calls.
pub trait StageRunner {
    /// Binary mask of the pixels inside `[lower, upper]`, eroded and then
    /// dilated as requested.
    fn threshold(
        &self,
        frame: &RgbImage,
        lower: Hsv,
        upper: Hsv,
        erode: bool,
        dilate: bool,
    ) -> GrayImage;

    /// Contour candidates in the mask.
    fn extract_shapes(&self, mask: &GrayImage) -> Vec<Candidate>;

    /// Candidates whose area, ratio and extent lie within the ranges.
    fn filter_shapes(
        &self,
        candidates: Vec<Candidate>,
        area: Range,
        ratio: Range,
        extent: Range,
        frame: Dimensions,
    ) -> Vec<Candidate>;

    /// Merge filtered candidates into target regions. Never returns more
    /// regions than candidates.
    fn group_shapes(
        &self,
        filtered: &[Candidate],
        intersection: IntersectionPolicy,
        group: GroupPolicy,
    ) -> Vec<Region>;

    /// Exactly one region from a non-empty list; `None` only when
    /// `grouped` is empty.
    fn select_target(&self, grouped: &[Region], sort: SortMode, frame: Dimensions)
    -> Option<Region>;
}

/// The built-in stage implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultStageRunner {
    /// Shape extraction algorithm.
    pub extractor: ShapeExtractorKind,
}

impl StageRunner for DefaultStageRunner {
    fn threshold(
        &self,
        frame: &RgbImage,
        lower: Hsv,
        upper: Hsv,
        erode: bool,
        dilate: bool,
    ) -> GrayImage {
        crate::threshold::threshold(frame, lower, upper, erode, dilate)
    }

    fn extract_shapes(&self, mask: &GrayImage) -> Vec<Candidate> {
        self.extractor.extract(mask)
    }

    fn filter_shapes(
        &self,
        candidates: Vec<Candidate>,
        area: Range,
        ratio: Range,
        extent: Range,
        frame: Dimensions,
    ) -> Vec<Candidate> {
        crate::filter::filter_shapes(candidates, area, ratio, extent, frame)
    }

    fn group_shapes(
        &self,
        filtered: &[Candidate],
        intersection: IntersectionPolicy,
        group: GroupPolicy,
    ) -> Vec<Region> {
        Grouping {
            group,
            intersection,
        }
        .group(filtered)
    }

    fn select_target(
        &self,
        grouped: &[Region],
        sort: SortMode,
        frame: Dimensions,
    ) -> Option<Region> {
        sort.select(grouped, frame)
    }
}

/// Correct a frame for the camera's mounting orientation.
///
/// Inverted cameras are rotated 180° in place; upright frames pass
/// through untouched.
#[must_use = "returns the corrected frame"]
pub fn orient(mut frame: RgbImage, orientation: Orientation) -> RgbImage {
    if orientation == Orientation::Inverted {
        image::imageops::rotate180_in_place(&mut frame);
    }
    frame
}
