//! Shared types for the huetrack vision stages.

use serde::{Deserialize, Serialize};

use crate::group::{GroupPolicy, IntersectionPolicy};
use crate::sort::SortMode;

/// Re-export `GrayImage` so downstream crates can reference threshold
/// masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference camera frames
/// and display outputs without depending on `image` directly.
pub use image::RgbImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel area.
    #[must_use]
    pub fn area(self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    /// Center of the image in pixel coordinates: between the two middle
    /// pixels of an even axis, on the middle pixel of an odd one.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(
            f64::from(self.width) / 2.0 - 0.5,
            f64::from(self.height) / 2.0 - 0.5,
        )
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Width and height of a (possibly rotated) rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Extent along the rectangle's own x axis.
    pub width: f64,
    /// Extent along the rectangle's own y axis.
    pub height: f64,
}

/// A rotated rectangle: the geometry of a detected target.
///
/// `angle` is in degrees, measured from the image x axis to the
/// rectangle's width side, normalized to `[-45, 45)` so `width` is always
/// the side closer to horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    /// Rectangle center.
    pub center: Point,
    /// Rectangle side lengths.
    pub size: Size,
    /// Rotation in degrees.
    pub angle: f64,
}

impl Region {
    /// Rectangle area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.size.width * self.size.height
    }

    /// Width divided by height, or `0.0` for a degenerate rectangle.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.size.height <= 0.0 {
            0.0
        } else {
            self.size.width / self.size.height
        }
    }

    /// The four corners, in order around the rectangle.
    #[must_use]
    pub fn corners(&self) -> [Point; 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let hw = self.size.width / 2.0;
        let hh = self.size.height / 2.0;
        let corner = |sx: f64, sy: f64| {
            let dx = sx * hw;
            let dy = sy * hh;
            Point::new(
                self.center.x + dx * cos - dy * sin,
                self.center.y + dx * sin + dy * cos,
            )
        };
        [
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        ]
    }
}

/// A color in OpenCV's 8-bit HSV scale: hue `0..=180`, saturation and
/// value `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue (half-degrees).
    pub h: u8,
    /// Saturation.
    pub s: u8,
    /// Value.
    pub v: u8,
}

impl Hsv {
    /// Create a new HSV triple.
    #[must_use]
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Returns `true` if every channel lies within `[lower, upper]`.
    #[must_use]
    pub const fn within(self, lower: Self, upper: Self) -> bool {
        self.h >= lower.h
            && self.h <= upper.h
            && self.s >= lower.s
            && self.s <= upper.s
            && self.v >= lower.v
            && self.v <= upper.v
    }
}

/// An inclusive numeric range used by the geometric filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
}

impl Range {
    /// Create a new range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns `true` if `value` lies within the range.
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// How the camera is mounted relative to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Upright; frames are used as captured.
    #[default]
    Normal,
    /// Upside down; frames are rotated 180° before processing.
    Inverted,
}

/// One named, selectable configuration for a full vision run.
///
/// Held behind an `Arc` by the runtime and replaced wholesale on edit, so
/// a reader never observes a half-updated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineSettings {
    /// Human-readable name shown in the UI.
    pub nickname: String,
    /// Camera mounting orientation.
    pub orientation: Orientation,
    /// Exposure applied to the device while this pipeline is active.
    pub exposure: f64,
    /// Brightness applied to the device while this pipeline is active.
    pub brightness: f64,
    /// Lower HSV threshold bound.
    pub hsv_lower: Hsv,
    /// Upper HSV threshold bound.
    pub hsv_upper: Hsv,
    /// Erode the threshold mask once.
    pub erode: bool,
    /// Dilate the threshold mask once.
    pub dilate: bool,
    /// Stream the threshold mask instead of the color frame.
    pub is_binary: bool,
    /// Accepted contour area, as a percentage of the frame area.
    pub area: Range,
    /// Accepted bounding-rectangle width / height.
    pub ratio: Range,
    /// Accepted contour area as a percentage of its bounding-rectangle area.
    pub extent: Range,
    /// How filtered contours are merged into targets.
    pub group_policy: GroupPolicy,
    /// Which side paired contours must converge toward.
    pub intersection_policy: IntersectionPolicy,
    /// Which target is reported when several remain.
    pub sort_mode: SortMode,
    /// Whether `m` and `b` hold a usable calibration line.
    pub is_calibrated: bool,
    /// Calibration line slope.
    pub m: f64,
    /// Calibration line intercept.
    pub b: f64,
}

impl PipelineSettings {
    /// Default nickname for a freshly created pipeline.
    pub const DEFAULT_NICKNAME: &'static str = "New Pipeline";
    /// Default device exposure.
    pub const DEFAULT_EXPOSURE: f64 = 50.0;
    /// Default device brightness.
    pub const DEFAULT_BRIGHTNESS: f64 = 50.0;
    /// Default lower HSV bound (accept everything).
    pub const DEFAULT_HSV_LOWER: Hsv = Hsv::new(0, 0, 0);
    /// Default upper HSV bound (accept everything).
    pub const DEFAULT_HSV_UPPER: Hsv = Hsv::new(180, 255, 255);
    /// Default area filter (percent of frame).
    pub const DEFAULT_AREA: Range = Range::new(0.0, 100.0);
    /// Default aspect-ratio filter.
    pub const DEFAULT_RATIO: Range = Range::new(0.0, 20.0);
    /// Default extent filter (percent).
    pub const DEFAULT_EXTENT: Range = Range::new(0.0, 100.0);

    /// Check the invariants the stages rely on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSettings`] if a range is inverted
    /// or not finite, an HSV bound pair is inverted, or the hue exceeds
    /// 180.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, range) in [
            ("area", self.area),
            ("ratio", self.ratio),
            ("extent", self.extent),
        ] {
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(PipelineError::InvalidSettings(format!(
                    "{name} range must be finite"
                )));
            }
            if range.min > range.max {
                return Err(PipelineError::InvalidSettings(format!(
                    "{name} range min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        if self.hsv_upper.h > 180 || self.hsv_lower.h > 180 {
            return Err(PipelineError::InvalidSettings(
                "hue bounds must not exceed 180".to_string(),
            ));
        }
        if self.hsv_lower.h > self.hsv_upper.h
            || self.hsv_lower.s > self.hsv_upper.s
            || self.hsv_lower.v > self.hsv_upper.v
        {
            return Err(PipelineError::InvalidSettings(
                "hsv lower bound exceeds upper bound".to_string(),
            ));
        }
        if !self.exposure.is_finite() || !self.brightness.is_finite() {
            return Err(PipelineError::InvalidSettings(
                "exposure and brightness must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            nickname: Self::DEFAULT_NICKNAME.to_string(),
            orientation: Orientation::default(),
            exposure: Self::DEFAULT_EXPOSURE,
            brightness: Self::DEFAULT_BRIGHTNESS,
            hsv_lower: Self::DEFAULT_HSV_LOWER,
            hsv_upper: Self::DEFAULT_HSV_UPPER,
            erode: false,
            dilate: false,
            is_binary: false,
            area: Self::DEFAULT_AREA,
            ratio: Self::DEFAULT_RATIO,
            extent: Self::DEFAULT_EXTENT,
            group_policy: GroupPolicy::default(),
            intersection_policy: IntersectionPolicy::default(),
            sort_mode: SortMode::default(),
            is_calibrated: false,
            m: 1.0,
            b: 0.0,
        }
    }
}

/// Outcome of processing one frame.
///
/// Exists for one publish cycle only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Whether a target was found.
    pub valid: bool,
    /// Raw detected geometry of the selected target.
    pub target: Option<Region>,
    /// Calibrated reference point the angles are measured against.
    pub calibrated: Point,
    /// Vertical angle to the target in degrees (up is positive).
    pub pitch: f64,
    /// Horizontal angle to the target in degrees (right is positive).
    pub yaw: f64,
}

impl PipelineResult {
    /// A result reporting that no target was found.
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Raw target center, or `[0, 0]` when invalid.
    #[must_use]
    pub fn raw_point(&self) -> [f64; 2] {
        match self.target {
            Some(region) if self.valid => [region.center.x, region.center.y],
            _ => [0.0, 0.0],
        }
    }
}

/// Errors that can occur while preparing a vision run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline settings violate an invariant.
    #[error("invalid pipeline settings: {0}")]
    InvalidSettings(String),

    /// The frame has zero width or height.
    #[error("frame is empty")]
    EmptyFrame,
}
