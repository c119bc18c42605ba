//! Target selection: pick one region out of the grouped targets.
//!
//! [`SortMode`] names the ordering rule; the [`TargetSelector`] trait lets
//! the stage runner swap in other rules. Ties keep the earliest region.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Region};

/// Which grouped target is reported when several remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortMode {
    /// Greatest rectangle area.
    #[default]
    Largest,
    /// Smallest rectangle area.
    Smallest,
    /// Closest to the top of the frame.
    Highest,
    /// Closest to the bottom of the frame.
    Lowest,
    /// Closest to the left edge.
    Leftmost,
    /// Closest to the right edge.
    Rightmost,
    /// Closest to the frame center, the same point
    /// [`CameraValues`](crate::CameraValues) measures angles from.
    Centermost,
}

/// Trait for target selection strategies.
///
/// Input: grouped target regions and the frame they came from.
/// Output: the chosen region, or `None` when `regions` is empty.
pub trait TargetSelector {
    /// Choose one region.
    fn select(&self, regions: &[Region], frame: Dimensions) -> Option<Region>;
}

impl TargetSelector for SortMode {
    fn select(&self, regions: &[Region], frame: Dimensions) -> Option<Region> {
        let center = frame.center();
        // Every mode is phrased as "smallest key wins".
        let key = |r: &Region| match self {
            Self::Largest => -r.area(),
            Self::Smallest => r.area(),
            Self::Highest => r.center.y,
            Self::Lowest => -r.center.y,
            Self::Leftmost => r.center.x,
            Self::Rightmost => -r.center.x,
            Self::Centermost => r.center.distance_squared(center),
        };
        regions
            .iter()
            .copied()
            .reduce(|best, r| match key(&r).total_cmp(&key(&best)) {
                Ordering::Less => r,
                Ordering::Equal | Ordering::Greater => best,
            })
    }
}
