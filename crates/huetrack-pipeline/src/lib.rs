//! huetrack-pipeline: per-frame color target detection (sans-IO).
//!
//! Turns one camera frame into a target result through:
//! orientation -> HSV threshold -> shape extraction -> geometric filter ->
//! grouping -> target selection -> calibrated angles -> overlay.
//!
//! This crate has **no I/O dependencies** and does not log. It operates on
//! in-memory frames and returns structured data; cameras, telemetry and
//! scheduling live in `huetrack-runtime`.

pub mod calibration;
pub mod contour;
pub mod filter;
pub mod geometry;
pub mod group;
pub mod overlay;
pub mod pipeline;
pub mod sort;
pub mod stages;
pub mod threshold;
pub mod types;

pub use calibration::CameraValues;
pub use contour::{Candidate, ShapeExtractor, ShapeExtractorKind};
pub use geometry::Pixel;
pub use group::{GroupPolicy, Grouping, IntersectionPolicy, TargetGrouper};
pub use pipeline::{
    Filtered, Grouped, Located, Oriented, Pending, Selected, ShapesFound, Stage, StageCounts,
    Stopped, Thresholded, VisionOutput,
};
pub use sort::{SortMode, TargetSelector};
pub use stages::{DefaultStageRunner, StageRunner};
pub use types::{
    Dimensions, GrayImage, Hsv, Orientation, PipelineError, PipelineResult, PipelineSettings,
    Point, Range, Region, RgbImage, Size,
};

/// Run every vision stage over one frame.
///
/// # Pipeline steps
///
/// 1. Orientation correction
/// 2. HSV threshold plus optional erode/dilate
/// 3. Shape extraction
/// 4. Area, ratio and extent filtering
/// 5. Grouping
/// 6. Target selection
/// 7. Calibration mapping and pitch/yaw
/// 8. Target overlay
///
/// Steps 3 through 6 end the run early when they produce nothing; the
/// returned output is then invalid and reports the stage in
/// [`VisionOutput::stopped_at`].
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFrame`] if the frame has zero width or
/// height.
pub fn process<R: StageRunner + ?Sized>(
    runner: &R,
    settings: &PipelineSettings,
    values: &CameraValues,
    frame: RgbImage,
) -> Result<VisionOutput, PipelineError> {
    if Dimensions::of(&frame).is_empty() {
        return Err(PipelineError::EmptyFrame);
    }
    let located = Pending::new(runner, settings, frame)
        .orient()
        .threshold()
        .extract_shapes()
        .and_then(ShapesFound::filter)
        .and_then(Filtered::group)
        .and_then(Grouped::select)
        .map(|selected| selected.locate(values));
    Ok(match located {
        Ok(located) => located.render(),
        Err(stopped) => stopped.into_output(),
    })
}

/// The frame streamed in driver mode: orientation-corrected, otherwise
/// untouched.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFrame`] if the frame has zero width or
/// height.
pub fn driver_frame(orientation: Orientation, frame: RgbImage) -> Result<RgbImage, PipelineError> {
    if Dimensions::of(&frame).is_empty() {
        return Err(PipelineError::EmptyFrame);
    }
    Ok(stages::orient(frame, orientation))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgb;

    use super::*;

    const ORANGE: Rgb<u8> = Rgb([255, 128, 0]);

    fn orange_settings() -> PipelineSettings {
        PipelineSettings {
            hsv_lower: Hsv::new(10, 150, 150),
            hsv_upper: Hsv::new(25, 255, 255),
            ..PipelineSettings::default()
        }
    }

    /// A 160×120 frame with orange rectangles drawn at the given
    /// `(x, y, w, h)` positions.
    fn scene(rects: &[(u32, u32, u32, u32)]) -> RgbImage {
        let mut frame = RgbImage::from_pixel(160, 120, Rgb([20, 20, 60]));
        for &(x0, y0, w, h) in rects {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    frame.put_pixel(x, y, ORANGE);
                }
            }
        }
        frame
    }

    fn values() -> CameraValues {
        CameraValues::from_fov(
            Dimensions {
                width: 160,
                height: 120,
            },
            CameraValues::DEFAULT_DIAGONAL_FOV,
        )
    }

    #[test]
    fn process_reports_single_target() {
        let frame = scene(&[(100, 20, 20, 10)]);
        let out = process(
            &DefaultStageRunner::default(),
            &orange_settings(),
            &values(),
            frame,
        )
        .unwrap();

        assert!(out.result.valid);
        assert_eq!(out.result.raw_point(), [109.5, 24.5]);
        assert_eq!(out.result.calibrated, values().center);
        assert!(out.result.yaw > 0.0);
        assert!(out.result.pitch > 0.0);
    }

    #[test]
    fn process_picks_largest_by_default() {
        let frame = scene(&[(10, 10, 6, 6), (80, 60, 30, 20)]);
        let out = process(
            &DefaultStageRunner::default(),
            &orange_settings(),
            &values(),
            frame,
        )
        .unwrap();
        assert_eq!(out.counts.found, 2);
        assert_eq!(out.result.raw_point(), [94.5, 69.5]);
    }

    #[test]
    fn process_sort_mode_changes_choice() {
        let settings = PipelineSettings {
            sort_mode: SortMode::Leftmost,
            ..orange_settings()
        };
        let frame = scene(&[(10, 10, 6, 6), (80, 60, 30, 20)]);
        let out = process(&DefaultStageRunner::default(), &settings, &values(), frame).unwrap();
        assert_eq!(out.result.raw_point(), [12.5, 12.5]);
    }

    #[test]
    fn process_without_match_is_invalid() {
        let out = process(
            &DefaultStageRunner::default(),
            &orange_settings(),
            &values(),
            scene(&[]),
        )
        .unwrap();
        assert!(!out.result.valid);
        assert_eq!(out.stopped_at, Some(Stage::Extract));
        assert_eq!(out.result.raw_point(), [0.0, 0.0]);
    }

    #[test]
    fn calibrated_pipeline_measures_from_line() {
        let settings = PipelineSettings {
            is_calibrated: true,
            m: 1.0,
            b: 0.0,
            ..orange_settings()
        };
        // On the line y = x the reference equals the target, so both
        // angles vanish.
        let frame = scene(&[(50, 50, 11, 11)]);
        let out = process(&DefaultStageRunner::default(), &settings, &values(), frame).unwrap();
        assert!(out.result.valid);
        assert!(out.result.yaw.abs() < 1e-9);
        assert!(out.result.pitch.abs() < 1e-9);
    }

    #[test]
    fn empty_frame_is_an_error() {
        let err = process(
            &DefaultStageRunner::default(),
            &orange_settings(),
            &values(),
            RgbImage::new(0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyFrame));
        assert!(driver_frame(Orientation::Normal, RgbImage::new(5, 0)).is_err());
    }

    #[test]
    fn driver_frame_keeps_pixels() {
        let frame = scene(&[(0, 0, 4, 4)]);
        let out = driver_frame(Orientation::Normal, frame.clone()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn stage_runner_is_object_safe() {
        let runner: &dyn StageRunner = &DefaultStageRunner::default();
        let out = process(runner, &orange_settings(), &values(), scene(&[])).unwrap();
        assert!(!out.result.valid);
    }
}
