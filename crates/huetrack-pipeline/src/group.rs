//! Grouping: merge filtered candidates into composite target regions.
//!
//! Many targets are made of two strips of tape angled toward each other.
//! This module defines the [`TargetGrouper`] trait for pluggable grouping
//! rules and the [`Grouping`] policy pair used by pipeline settings:
//!
//! - [`GroupPolicy::Single`]: every candidate is its own target.
//! - [`GroupPolicy::Dual`]: candidates are sorted left to right and
//!   adjacent pairs are merged when their fitted axes intersect on the side
//!   named by the [`IntersectionPolicy`]. Each candidate joins at most one
//!   pair; candidates left unpaired are dropped.
//!
//! Grouping never produces more regions than it receives candidates.

use serde::{Deserialize, Serialize};

use crate::contour::Candidate;
use crate::geometry::{Line, bounding_region};
use crate::types::{Point, Region};

/// How many candidates make up one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupPolicy {
    /// One candidate per target.
    #[default]
    Single,
    /// Two adjacent candidates per target.
    Dual,
}

/// Where the fitted axes of a candidate pair must meet for the pair to be
/// grouped. Directions are in image space (`Up` is toward row 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntersectionPolicy {
    /// Accept any adjacent pair.
    #[default]
    None,
    /// Axes meet above the pair.
    Up,
    /// Axes meet below the pair.
    Down,
    /// Axes meet left of the pair.
    Left,
    /// Axes meet right of the pair.
    Right,
}

impl IntersectionPolicy {
    /// Whether a pair centered at `midpoint` whose axes meet at
    /// `intersection` satisfies this policy.
    #[must_use]
    pub fn accepts(self, intersection: Option<Point>, midpoint: Point) -> bool {
        match (self, intersection) {
            (Self::None, _) => true,
            (_, None) => false,
            (Self::Up, Some(p)) => p.y < midpoint.y,
            (Self::Down, Some(p)) => p.y > midpoint.y,
            (Self::Left, Some(p)) => p.x < midpoint.x,
            (Self::Right, Some(p)) => p.x > midpoint.x,
        }
    }
}

/// A grouping rule: the policy pair stored in pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grouping {
    /// Candidates per target.
    pub group: GroupPolicy,
    /// Pairing constraint for [`GroupPolicy::Dual`].
    pub intersection: IntersectionPolicy,
}

/// Trait for grouping strategies.
///
/// Input: filtered candidates in extraction order.
/// Output: at most `candidates.len()` target regions.
pub trait TargetGrouper {
    /// Merge candidates into target regions.
    fn group(&self, candidates: &[Candidate]) -> Vec<Region>;
}

impl TargetGrouper for Grouping {
    fn group(&self, candidates: &[Candidate]) -> Vec<Region> {
        match self.group {
            GroupPolicy::Single => candidates.iter().map(|c| c.rect).collect(),
            GroupPolicy::Dual => group_pairs(candidates, self.intersection),
        }
    }
}

/// Pair adjacent candidates (by rectangle center x) that satisfy the
/// intersection policy, merging each pair's points into one rectangle.
fn group_pairs(candidates: &[Candidate], policy: IntersectionPolicy) -> Vec<Region> {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.rect.center.x.total_cmp(&b.rect.center.x));

    let mut regions = Vec::new();
    let mut i = 0;
    while i + 1 < ordered.len() {
        let (a, b) = (ordered[i], ordered[i + 1]);
        let axis = Line::fit(&a.points());
        let intersection = axis.intersection(&Line::fit(&b.points()));
        let midpoint = Point::new(
            f64::midpoint(a.rect.center.x, b.rect.center.x),
            f64::midpoint(a.rect.center.y, b.rect.center.y),
        );
        if policy.accepts(intersection, midpoint) {
            let mut merged = Vec::with_capacity(a.pixels.len() + b.pixels.len());
            merged.extend_from_slice(&a.pixels);
            merged.extend_from_slice(&b.pixels);
            regions.push(bounding_region(&merged));
            i += 2;
        } else {
            i += 1;
        }
    }
    regions
}
