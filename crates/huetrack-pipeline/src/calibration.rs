//! Camera intrinsics and pixel-to-angle conversion.
//!
//! [`CameraValues`] derives the sensor center and the horizontal and
//! vertical focal lengths from a diagonal field of view and the frame
//! size. [`calibrated_reference`] maps a target center through the
//! pipeline's calibration line to the point angles are measured against.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineSettings, Point};

/// Slopes smaller than this cannot be inverted for the calibrated X.
pub const SLOPE_EPSILON: f64 = 1e-9;

/// Focal geometry for one video mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraValues {
    /// Optical center in pixels.
    pub center: Point,
    /// Horizontal focal length in pixels.
    pub horizontal_focal_length: f64,
    /// Vertical focal length in pixels.
    pub vertical_focal_length: f64,
}

impl CameraValues {
    /// Typical diagonal field of view of a USB webcam, in degrees.
    pub const DEFAULT_DIAGONAL_FOV: f64 = 60.8;

    /// Derive focal lengths from a diagonal field of view in degrees.
    ///
    /// The diagonal angle is split across the axes in proportion to the
    /// frame's aspect ratio. The optical center is
    /// [`Dimensions::center`].
    #[must_use]
    pub fn from_fov(dimensions: Dimensions, diagonal_fov: f64) -> Self {
        let width = f64::from(dimensions.width);
        let height = f64::from(dimensions.height);
        let center = dimensions.center();

        let diagonal = width.hypot(height);
        let half_tan = (diagonal_fov.to_radians() / 2.0).tan();
        let horizontal_view = 2.0 * (half_tan * width / diagonal).atan();
        let vertical_view = 2.0 * (half_tan * height / diagonal).atan();

        Self {
            center,
            horizontal_focal_length: focal_length(width, horizontal_view),
            vertical_focal_length: focal_length(height, vertical_view),
        }
    }

    /// Vertical angle in degrees from `calibrated_y` to `pixel_y`.
    ///
    /// Image y grows downward, so a target above the reference has a
    /// positive pitch.
    #[must_use]
    pub fn pitch(&self, pixel_y: f64, calibrated_y: f64) -> f64 {
        -((pixel_y - calibrated_y) / self.vertical_focal_length)
            .atan()
            .to_degrees()
    }

    /// Horizontal angle in degrees from `calibrated_x` to `pixel_x`.
    #[must_use]
    pub fn yaw(&self, pixel_x: f64, calibrated_x: f64) -> f64 {
        ((pixel_x - calibrated_x) / self.horizontal_focal_length)
            .atan()
            .to_degrees()
    }
}

/// Pixels across `extent` seen under the full angle `view` (radians).
fn focal_length(extent: f64, view: f64) -> f64 {
    let tan = (view / 2.0).tan();
    if tan <= 0.0 { 0.0 } else { extent / (2.0 * tan) }
}

/// The point a target's angles are measured against.
///
/// Uncalibrated pipelines use the sensor center. Calibrated pipelines map
/// the target center through the line `y = m·x + b`: the reference X is
/// the line inverted at the target's y, and the reference Y is the line
/// evaluated at the target's x. A near-zero slope falls back to the
/// sensor center.
#[must_use]
pub fn calibrated_reference(
    settings: &PipelineSettings,
    values: &CameraValues,
    target: Point,
) -> Point {
    if !settings.is_calibrated || settings.m.abs() < SLOPE_EPSILON {
        return values.center;
    }
    Point::new(
        (target.y - settings.b) / settings.m,
        target.x.mul_add(settings.m, settings.b),
    )
}
