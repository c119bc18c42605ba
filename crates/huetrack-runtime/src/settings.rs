//! Persistent camera and pipeline settings.
//!
//! A settings file is one JSON document listing every camera with its
//! video mode, field of view, current pipeline and pipeline mapping:
//!
//! ```json
//! {
//!   "cameras": [
//!     {
//!       "name": "front",
//!       "video_mode": { "width": 320, "height": 240, "fps": 30 },
//!       "fov": 60.8,
//!       "current_pipeline": 0,
//!       "pipelines": { "0": { "nickname": "tape" } }
//!     }
//!   ]
//! }
//! ```
//!
//! Missing pipeline fields take their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use huetrack_pipeline::{CameraValues, PipelineSettings};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraError, VideoMode};

/// Errors loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file could not be read or written.
    #[error("settings file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid settings JSON.
    #[error("settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A camera entry violates the pipeline mapping invariant.
    #[error("camera {name:?}: {source}")]
    InvalidCamera {
        /// Camera name.
        name: String,
        /// The violated invariant.
        source: CameraError,
    },
}

/// One camera's persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera name.
    pub name: String,
    /// Capture mode.
    #[serde(default)]
    pub video_mode: VideoMode,
    /// Diagonal field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov: f64,
    /// Selected pipeline index.
    #[serde(default)]
    pub current_pipeline: usize,
    /// Pipelines by index.
    pub pipelines: BTreeMap<usize, PipelineSettings>,
}

const fn default_fov() -> f64 {
    CameraValues::DEFAULT_DIAGONAL_FOV
}

impl CameraConfig {
    /// Build the runtime camera.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidCamera`] if the mapping is empty,
    /// the current index dangles, or a pipeline is invalid.
    pub fn into_camera(self) -> Result<Camera, SettingsError> {
        let name = self.name.clone();
        Camera::new(
            self.name,
            self.video_mode,
            self.fov,
            self.pipelines,
            self.current_pipeline,
        )
        .map_err(|source| SettingsError::InvalidCamera { name, source })
    }

    /// Snapshot a runtime camera.
    #[must_use]
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            name: camera.name().to_string(),
            video_mode: camera.video_mode(),
            fov: camera.diagonal_fov(),
            current_pipeline: camera.current_index(),
            pipelines: camera
                .pipelines()
                .map(|(index, settings)| (index, PipelineSettings::clone(settings)))
                .collect(),
        }
    }
}

/// The whole settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsStore {
    /// Every configured camera.
    pub cameras: Vec<CameraConfig>,
}

impl SettingsStore {
    /// Parse a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Json`] if the text is not a valid
    /// document.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] if the file cannot be read and
    /// [`SettingsError::Json`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Write a settings file, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Snapshot runtime cameras.
    #[must_use]
    pub fn from_cameras<'a>(cameras: impl IntoIterator<Item = &'a Camera>) -> Self {
        Self {
            cameras: cameras.into_iter().map(CameraConfig::from_camera).collect(),
        }
    }

    /// Build every runtime camera.
    ///
    /// # Errors
    ///
    /// Returns the first [`SettingsError::InvalidCamera`].
    pub fn into_cameras(self) -> Result<Vec<Camera>, SettingsError> {
        self.cameras
            .into_iter()
            .map(CameraConfig::into_camera)
            .collect()
    }
}
