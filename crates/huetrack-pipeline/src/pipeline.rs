//! Per-frame stage chain: advance one vision stage at a time.
//!
//! ```rust
//! # use huetrack_pipeline::{
//! #     CameraValues, DefaultStageRunner, Dimensions, Pending, PipelineSettings, RgbImage,
//! #     Stopped,
//! # };
//! # fn run(frame: RgbImage) -> Result<(), Stopped> {
//! let runner = DefaultStageRunner::default();
//! let settings = PipelineSettings::default();
//! let values = CameraValues::from_fov(Dimensions::of(&frame), 60.0);
//! let output = Pending::new(&runner, &settings, frame)
//!     .orient()
//!     .threshold()
//!     .extract_shapes()?
//!     .filter()?
//!     .group()?
//!     .select()?
//!     .locate(&values)
//!     .render();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state. The
//! extraction, filtering, grouping and selection stages return
//! `Err(`[`Stopped`]`)` when they produce nothing; [`Stopped`] still owns
//! the display image so it can be streamed, and converts into an invalid
//! [`VisionOutput`].
//!
//! Every buffer is owned by the chain, so all of them are dropped when the
//! final state (or the [`Stopped`] value) goes out of scope.

use image::RgbImage;

use crate::calibration::{self, CameraValues};
use crate::contour::Candidate;
use crate::stages::StageRunner;
use crate::types::{Dimensions, GrayImage, PipelineResult, PipelineSettings, Region};

/// The stages that can end a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Shape extraction found no candidates.
    Extract,
    /// No candidate passed the geometric filter.
    Filter,
    /// Grouping produced no targets.
    Group,
    /// No target was selected.
    Select,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Filter => "filter",
            Self::Group => "group",
            Self::Select => "select",
        };
        f.write_str(name)
    }
}

/// How many shapes survived each stage, for trace logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Candidates extracted from the mask.
    pub found: usize,
    /// Candidates that passed the filter.
    pub filtered: usize,
    /// Targets after grouping.
    pub grouped: usize,
}

/// Final output of one vision run.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionOutput {
    /// The published result.
    pub result: PipelineResult,
    /// Image streamed to the operator.
    pub display: RgbImage,
    /// Per-stage survivor counts.
    pub counts: StageCounts,
    /// The stage that ended the run, if it ended early.
    pub stopped_at: Option<Stage>,
}

/// A run that ended early because a stage produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Stopped {
    /// The stage that came up empty.
    pub stage: Stage,
    /// Display image as of the threshold stage.
    pub display: RgbImage,
    /// Counts up to the stopping stage.
    pub counts: StageCounts,
}

impl Stopped {
    /// An invalid output carrying the display image.
    #[must_use]
    pub fn into_output(self) -> VisionOutput {
        VisionOutput {
            result: PipelineResult::invalid(),
            display: self.display,
            counts: self.counts,
            stopped_at: Some(self.stage),
        }
    }
}

impl From<Stopped> for VisionOutput {
    fn from(stopped: Stopped) -> Self {
        stopped.into_output()
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// A frame that has not been touched yet.
#[must_use = "pipeline stages are consumed by advancing, call .orient() to continue"]
pub struct Pending<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    frame: RgbImage,
}

impl<'a, R: StageRunner + ?Sized> Pending<'a, R> {
    /// Start a run over `frame` with one settings snapshot.
    pub const fn new(runner: &'a R, settings: &'a PipelineSettings, frame: RgbImage) -> Self {
        Self {
            runner,
            settings,
            frame,
        }
    }

    /// Apply the orientation correction.
    pub fn orient(self) -> Oriented<'a, R> {
        let frame = crate::stages::orient(self.frame, self.settings.orientation);
        Oriented {
            runner: self.runner,
            settings: self.settings,
            dimensions: Dimensions::of(&frame),
            frame,
        }
    }
}

// ───────────────────────── Stage 1: Oriented ─────────────────────────

/// An orientation-corrected frame.
///
/// Driver mode never builds stages; it streams
/// [`driver_frame`](crate::driver_frame) instead.
#[must_use = "pipeline stages are consumed by advancing, call .threshold() to continue"]
pub struct Oriented<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    frame: RgbImage,
    dimensions: Dimensions,
}

impl<'a, R: StageRunner + ?Sized> Oriented<'a, R> {
    /// The corrected frame.
    #[must_use]
    pub const fn frame(&self) -> &RgbImage {
        &self.frame
    }

    /// Threshold the frame and build the display image.
    pub fn threshold(self) -> Thresholded<'a, R> {
        let s = self.settings;
        let mask = self
            .runner
            .threshold(&self.frame, s.hsv_lower, s.hsv_upper, s.erode, s.dilate);
        let display = crate::threshold::display_output(self.frame, &mask, s.is_binary);
        Thresholded {
            runner: self.runner,
            settings: self.settings,
            dimensions: self.dimensions,
            mask,
            display,
        }
    }
}

// ───────────────────────── Stage 2: Thresholded ──────────────────────

/// A binary mask plus the display image.
#[must_use = "pipeline stages are consumed by advancing, call .extract_shapes() to continue"]
pub struct Thresholded<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    dimensions: Dimensions,
    mask: GrayImage,
    display: RgbImage,
}

impl<'a, R: StageRunner + ?Sized> Thresholded<'a, R> {
    /// The threshold mask.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// The display image.
    #[must_use]
    pub const fn display(&self) -> &RgbImage {
        &self.display
    }

    /// Find contour candidates in the mask.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] at [`Stage::Extract`] when the mask holds no
    /// shapes.
    pub fn extract_shapes(self) -> Result<ShapesFound<'a, R>, Stopped> {
        let candidates = self.runner.extract_shapes(&self.mask);
        let counts = StageCounts {
            found: candidates.len(),
            ..StageCounts::default()
        };
        if candidates.is_empty() {
            return Err(Stopped {
                stage: Stage::Extract,
                display: self.display,
                counts,
            });
        }
        Ok(ShapesFound {
            runner: self.runner,
            settings: self.settings,
            dimensions: self.dimensions,
            display: self.display,
            candidates,
            counts,
        })
    }
}

// ───────────────────────── Stage 3: ShapesFound ──────────────────────

/// Raw contour candidates.
#[must_use = "pipeline stages are consumed by advancing, call .filter() to continue"]
pub struct ShapesFound<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    dimensions: Dimensions,
    display: RgbImage,
    candidates: Vec<Candidate>,
    counts: StageCounts,
}

impl<'a, R: StageRunner + ?Sized> ShapesFound<'a, R> {
    /// Candidates found in the mask.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Drop candidates outside the area, ratio and extent ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] at [`Stage::Filter`] when nothing survives.
    pub fn filter(self) -> Result<Filtered<'a, R>, Stopped> {
        let s = self.settings;
        let filtered =
            self.runner
                .filter_shapes(self.candidates, s.area, s.ratio, s.extent, self.dimensions);
        let counts = StageCounts {
            filtered: filtered.len(),
            ..self.counts
        };
        if filtered.is_empty() {
            return Err(Stopped {
                stage: Stage::Filter,
                display: self.display,
                counts,
            });
        }
        Ok(Filtered {
            runner: self.runner,
            settings: self.settings,
            dimensions: self.dimensions,
            display: self.display,
            filtered,
            counts,
        })
    }
}

// ───────────────────────── Stage 4: Filtered ─────────────────────────

/// Candidates that passed the geometric filter.
#[must_use = "pipeline stages are consumed by advancing, call .group() to continue"]
pub struct Filtered<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    dimensions: Dimensions,
    display: RgbImage,
    filtered: Vec<Candidate>,
    counts: StageCounts,
}

impl<'a, R: StageRunner + ?Sized> Filtered<'a, R> {
    /// Surviving candidates.
    #[must_use]
    pub fn filtered(&self) -> &[Candidate] {
        &self.filtered
    }

    /// Merge candidates into targets.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] at [`Stage::Group`] when no target forms.
    pub fn group(self) -> Result<Grouped<'a, R>, Stopped> {
        let s = self.settings;
        let grouped =
            self.runner
                .group_shapes(&self.filtered, s.intersection_policy, s.group_policy);
        let counts = StageCounts {
            grouped: grouped.len(),
            ..self.counts
        };
        if grouped.is_empty() {
            return Err(Stopped {
                stage: Stage::Group,
                display: self.display,
                counts,
            });
        }
        Ok(Grouped {
            runner: self.runner,
            settings: self.settings,
            dimensions: self.dimensions,
            display: self.display,
            grouped,
            counts,
        })
    }
}

// ───────────────────────── Stage 5: Grouped ──────────────────────────

/// Composite target regions.
#[must_use = "pipeline stages are consumed by advancing, call .select() to continue"]
pub struct Grouped<'a, R: StageRunner + ?Sized> {
    runner: &'a R,
    settings: &'a PipelineSettings,
    dimensions: Dimensions,
    display: RgbImage,
    grouped: Vec<Region>,
    counts: StageCounts,
}

impl<'a, R: StageRunner + ?Sized> Grouped<'a, R> {
    /// Grouped targets.
    #[must_use]
    pub fn grouped(&self) -> &[Region] {
        &self.grouped
    }

    /// Pick the single reported target.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] at [`Stage::Select`] if the runner selects
    /// nothing.
    pub fn select(self) -> Result<Selected<'a>, Stopped> {
        let target =
            self.runner
                .select_target(&self.grouped, self.settings.sort_mode, self.dimensions);
        match target {
            Some(target) => Ok(Selected {
                settings: self.settings,
                display: self.display,
                target,
                counts: self.counts,
            }),
            None => Err(Stopped {
                stage: Stage::Select,
                display: self.display,
                counts: self.counts,
            }),
        }
    }
}

// ───────────────────────── Stage 6: Selected ─────────────────────────

/// The chosen target, before angle computation.
#[must_use = "pipeline stages are consumed by advancing, call .locate() to continue"]
pub struct Selected<'a> {
    settings: &'a PipelineSettings,
    display: RgbImage,
    target: Region,
    counts: StageCounts,
}

impl<'a> Selected<'a> {
    /// The chosen target.
    #[must_use]
    pub const fn target(&self) -> &Region {
        &self.target
    }

    /// Map the target through the calibration line and compute its angles.
    pub fn locate(self, values: &CameraValues) -> Located {
        let center = self.target.center;
        let calibrated = calibration::calibrated_reference(self.settings, values, center);
        let result = PipelineResult {
            valid: true,
            target: Some(self.target),
            calibrated,
            pitch: values.pitch(center.y, calibrated.y),
            yaw: values.yaw(center.x, calibrated.x),
        };
        Located {
            display: self.display,
            result,
            counts: self.counts,
        }
    }
}

// ───────────────────────── Stage 7: Located ──────────────────────────

/// A valid result awaiting the overlay.
#[must_use = "pipeline stages are consumed by advancing, call .render() to continue"]
pub struct Located {
    display: RgbImage,
    result: PipelineResult,
    counts: StageCounts,
}

impl Located {
    /// The computed result.
    #[must_use]
    pub const fn result(&self) -> &PipelineResult {
        &self.result
    }

    /// Draw the target overlay and finish the run.
    pub fn render(mut self) -> VisionOutput {
        if let Some(target) = &self.result.target {
            crate::overlay::draw_target(&mut self.display, target);
        }
        VisionOutput {
            result: self.result,
            display: self.display,
            counts: self.counts,
            stopped_at: None,
        }
    }
}
