//! Camera state and the device control seam.
//!
//! A [`Camera`] owns the ordered pipeline mapping and the current index,
//! and guarantees the index always resolves. A [`CameraDevice`] is the
//! hardware side: it reports its video mode and accepts exposure and
//! brightness changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use huetrack_pipeline::{CameraValues, Dimensions, PipelineError, PipelineSettings};
use serde::{Deserialize, Serialize};

/// Resolution and frame rate of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMode {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal sensor frame rate.
    pub fps: u32,
}

impl VideoMode {
    /// Frame dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 30,
        }
    }
}

/// Violations of the camera's pipeline mapping invariant.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The camera has no pipelines at all.
    #[error("camera {0:?} has no pipelines")]
    NoPipelines(String),

    /// The requested index is not in the mapping.
    #[error("pipeline {0} does not exist")]
    MissingPipeline(usize),

    /// The current pipeline cannot be removed.
    #[error("pipeline {0} is selected and cannot be removed")]
    RemoveCurrent(usize),

    /// The replacement settings are invalid.
    #[error(transparent)]
    InvalidSettings(#[from] PipelineError),
}

/// One camera: its pipelines, current selection and focal geometry.
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    pipelines: BTreeMap<usize, Arc<PipelineSettings>>,
    current: usize,
    video_mode: VideoMode,
    diagonal_fov: f64,
    values: CameraValues,
}

impl Camera {
    /// Build a camera whose current index is `current`.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::NoPipelines`] for an empty mapping,
    /// [`CameraError::MissingPipeline`] if `current` is not in it, or
    /// [`CameraError::InvalidSettings`] if any pipeline fails validation.
    pub fn new(
        name: impl Into<String>,
        video_mode: VideoMode,
        diagonal_fov: f64,
        pipelines: BTreeMap<usize, PipelineSettings>,
        current: usize,
    ) -> Result<Self, CameraError> {
        let name = name.into();
        if pipelines.is_empty() {
            return Err(CameraError::NoPipelines(name));
        }
        if !pipelines.contains_key(&current) {
            return Err(CameraError::MissingPipeline(current));
        }
        for settings in pipelines.values() {
            settings.validate()?;
        }
        Ok(Self {
            values: CameraValues::from_fov(video_mode.dimensions(), diagonal_fov),
            name,
            pipelines: pipelines
                .into_iter()
                .map(|(index, settings)| (index, Arc::new(settings)))
                .collect(),
            current,
            video_mode,
            diagonal_fov,
        })
    }

    /// A camera with one default pipeline at index 0.
    #[must_use]
    pub fn with_default_pipeline(name: impl Into<String>, video_mode: VideoMode) -> Self {
        let diagonal_fov = CameraValues::DEFAULT_DIAGONAL_FOV;
        Self {
            name: name.into(),
            pipelines: BTreeMap::from([(0, Arc::new(PipelineSettings::default()))]),
            current: 0,
            video_mode,
            diagonal_fov,
            values: CameraValues::from_fov(video_mode.dimensions(), diagonal_fov),
        }
    }

    /// Camera name (also its telemetry namespace).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the selected pipeline.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// The selected pipeline's settings.
    #[must_use]
    pub fn current_pipeline(&self) -> Arc<PipelineSettings> {
        // The constructor and every mutator keep `current` in the mapping.
        self.pipelines
            .get(&self.current)
            .cloned()
            .unwrap_or_default()
    }

    /// Settings at `index`, if present.
    #[must_use]
    pub fn pipeline(&self, index: usize) -> Option<&Arc<PipelineSettings>> {
        self.pipelines.get(&index)
    }

    /// All pipelines in index order.
    pub fn pipelines(&self) -> impl Iterator<Item = (usize, &Arc<PipelineSettings>)> {
        self.pipelines.iter().map(|(index, settings)| (*index, settings))
    }

    /// Capture mode the focal geometry was derived from.
    #[must_use]
    pub const fn video_mode(&self) -> VideoMode {
        self.video_mode
    }

    /// Diagonal field of view in degrees.
    #[must_use]
    pub const fn diagonal_fov(&self) -> f64 {
        self.diagonal_fov
    }

    /// Focal geometry for angle conversion.
    #[must_use]
    pub const fn values(&self) -> &CameraValues {
        &self.values
    }

    /// Select the pipeline at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::MissingPipeline`] and leaves the selection
    /// unchanged if `index` is not in the mapping.
    pub fn select(&mut self, index: usize) -> Result<(), CameraError> {
        if !self.pipelines.contains_key(&index) {
            return Err(CameraError::MissingPipeline(index));
        }
        self.current = index;
        Ok(())
    }

    /// Insert or wholesale-replace the pipeline at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::InvalidSettings`] if `settings` fails
    /// validation.
    pub fn replace_pipeline(
        &mut self,
        index: usize,
        settings: PipelineSettings,
    ) -> Result<(), CameraError> {
        settings.validate()?;
        self.pipelines.insert(index, Arc::new(settings));
        Ok(())
    }

    /// Remove the pipeline at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::RemoveCurrent`] for the selected pipeline
    /// and [`CameraError::MissingPipeline`] for an absent one.
    pub fn remove_pipeline(&mut self, index: usize) -> Result<Arc<PipelineSettings>, CameraError> {
        if index == self.current {
            return Err(CameraError::RemoveCurrent(index));
        }
        self.pipelines
            .remove(&index)
            .ok_or(CameraError::MissingPipeline(index))
    }
}

/// Errors reported by camera hardware.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// The device refused an exposure value.
    #[error("failed to set exposure to {0}")]
    ExposureSetFailure(f64),

    /// The device refused a brightness value.
    #[error("failed to set brightness to {0}")]
    BrightnessSetFailure(f64),

    /// The device is no longer reachable.
    #[error("camera device disconnected")]
    Disconnected,
}

/// Control surface of a physical camera.
pub trait CameraDevice {
    /// Current capture mode.
    fn video_mode(&self) -> VideoMode;

    /// Apply an exposure value.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the hardware rejects the value.
    fn set_exposure(&mut self, exposure: f64) -> Result<(), DeviceError>;

    /// Apply a brightness value.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the hardware rejects the value.
    fn set_brightness(&mut self, brightness: f64) -> Result<(), DeviceError>;
}

/// A device with no hardware behind it that remembers the last values it
/// was given. Non-finite values are refused and leave the last value in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullDevice {
    video_mode: VideoMode,
    exposure: Option<f64>,
    brightness: Option<f64>,
}

impl NullDevice {
    /// A device reporting `video_mode`.
    #[must_use]
    pub const fn new(video_mode: VideoMode) -> Self {
        Self {
            video_mode,
            exposure: None,
            brightness: None,
        }
    }

    /// Last exposure applied.
    #[must_use]
    pub const fn exposure(&self) -> Option<f64> {
        self.exposure
    }

    /// Last brightness applied.
    #[must_use]
    pub const fn brightness(&self) -> Option<f64> {
        self.brightness
    }
}

impl CameraDevice for NullDevice {
    fn video_mode(&self) -> VideoMode {
        self.video_mode
    }

    fn set_exposure(&mut self, exposure: f64) -> Result<(), DeviceError> {
        if !exposure.is_finite() {
            return Err(DeviceError::ExposureSetFailure(exposure));
        }
        self.exposure = Some(exposure);
        Ok(())
    }

    fn set_brightness(&mut self, brightness: f64) -> Result<(), DeviceError> {
        if !brightness.is_finite() {
            return Err(DeviceError::BrightnessSetFailure(brightness));
        }
        self.brightness = Some(brightness);
        Ok(())
    }
}
