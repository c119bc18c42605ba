//! Planar geometry over contour points: rotated bounding rectangles and
//! principal-axis line fitting.
//!
//! Contours stay on the integer pixel grid [`Pixel`] that
//! `imageproc::contours` traces; line fitting works on floating-point
//! [`Point`]s.

use imageproc::geometry::min_area_rect;

use crate::types::{Point, Region, Size};

/// Contour point on the pixel grid.
pub type Pixel = imageproc::point::Point<i32>;

/// Parallel-line tolerance for [`Line::intersection`].
const PARALLEL_EPSILON: f64 = 1e-9;

/// A pixel as a floating-point point.
#[must_use]
pub fn pixel_point(pixel: Pixel) -> Point {
    Point::new(f64::from(pixel.x), f64::from(pixel.y))
}

/// Arithmetic mean of the points, or the origin for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Minimum-area rotated rectangle around pixel points.
///
/// Built on `imageproc::geometry::min_area_rect`, whose corners come back
/// snapped outward to whole pixels. The angle is normalized to
/// `[-45, 45)` degrees. No points give the default region.
#[must_use]
pub fn bounding_region(pixels: &[Pixel]) -> Region {
    if pixels.is_empty() {
        return Region::default();
    }
    let corners = min_area_rect(pixels).map(pixel_point);
    let [top_left, top_right, bottom_right, _] = corners;
    normalize(Region {
        center: centroid(&corners),
        size: Size {
            width: top_left.distance(top_right),
            height: top_right.distance(bottom_right),
        },
        angle: (top_right.y - top_left.y)
            .atan2(top_right.x - top_left.x)
            .to_degrees(),
    })
}

/// Rotate the rectangle's frame by quarter turns until the angle lies in
/// `[-45, 45)`, swapping sides as needed.
fn normalize(mut region: Region) -> Region {
    while region.angle >= 45.0 {
        region.angle -= 90.0;
        std::mem::swap(&mut region.size.width, &mut region.size.height);
    }
    while region.angle < -45.0 {
        region.angle += 90.0;
        std::mem::swap(&mut region.size.width, &mut region.size.height);
    }
    region
}

/// An infinite line through `origin` along unit vector `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// A point on the line.
    pub origin: Point,
    /// Unit direction.
    pub direction: Point,
}

impl Line {
    /// Least-squares line through the points: the centroid plus the
    /// principal axis of their covariance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(points: &[Point]) -> Self {
        let origin = centroid(points);
        let n = points.len().max(1) as f64;
        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for p in points {
            let dx = p.x - origin.x;
            let dy = p.y - origin.y;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        let theta = 0.5 * (2.0 * sxy / n).atan2((sxx - syy) / n);
        let (sin, cos) = theta.sin_cos();
        Self {
            origin,
            direction: Point::new(cos, sin),
        }
    }

    /// Intersection with another line, or `None` when parallel.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Point> {
        let d1 = self.direction;
        let d2 = other.direction;
        let denom = d1.x.mul_add(d2.y, -(d1.y * d2.x));
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }
        let wx = other.origin.x - self.origin.x;
        let wy = other.origin.y - self.origin.y;
        let t = wx.mul_add(d2.y, -(wy * d2.x)) / denom;
        Some(Point::new(
            d1.x.mul_add(t, self.origin.x),
            d1.y.mul_add(t, self.origin.y),
        ))
    }
}
