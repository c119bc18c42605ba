//! Driver / Vision mode.
//!
//! Driver mode is for a human looking at the stream: the device runs at a
//! fixed low exposure and brightness and the vision stages are skipped.

use huetrack_pipeline::PipelineSettings;

use crate::camera::{CameraDevice, DeviceError};

/// Exposure applied while in driver mode.
pub const DRIVER_EXPOSURE: f64 = 25.0;

/// Brightness applied while in driver mode.
pub const DRIVER_BRIGHTNESS: f64 = 15.0;

/// Mutually exclusive processing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Run the vision stages.
    #[default]
    Vision,
    /// Stream the frame for a human; skip the vision stages.
    Driver,
}

/// Exposure and brightness to put on the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveExposure {
    /// Device exposure.
    pub exposure: f64,
    /// Device brightness.
    pub brightness: f64,
}

impl LiveExposure {
    /// Push both values to `device`.
    ///
    /// Brightness is still attempted when exposure fails; the first error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`DeviceError`] the device reports.
    pub fn apply<D: CameraDevice + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        let exposure = device.set_exposure(self.exposure);
        let brightness = device.set_brightness(self.brightness);
        exposure.and(brightness)
    }
}

/// Tracks the current mode and the device values it implies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    /// A controller starting in `mode`.
    #[must_use]
    pub const fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the vision stages are bypassed.
    #[must_use]
    pub fn is_driver(&self) -> bool {
        self.mode == Mode::Driver
    }

    /// The values the device should hold in the current mode: the driver
    /// override, or the selected pipeline's own values.
    #[must_use]
    pub fn live_exposure(&self, settings: &PipelineSettings) -> LiveExposure {
        match self.mode {
            Mode::Driver => LiveExposure {
                exposure: DRIVER_EXPOSURE,
                brightness: DRIVER_BRIGHTNESS,
            },
            Mode::Vision => LiveExposure {
                exposure: settings.exposure,
                brightness: settings.brightness,
            },
        }
    }

    /// Switch modes, updating the device when the mode actually changes.
    ///
    /// Returns `Ok(true)` if the mode changed. The mode changes even if
    /// the device rejects the new values.
    ///
    /// # Errors
    ///
    /// Returns the [`DeviceError`] from applying the new values.
    pub fn set_mode<D: CameraDevice + ?Sized>(
        &mut self,
        mode: Mode,
        device: &mut D,
        settings: &PipelineSettings,
    ) -> Result<bool, DeviceError> {
        if self.mode == mode {
            return Ok(false);
        }
        self.mode = mode;
        self.live_exposure(settings).apply(device)?;
        Ok(true)
    }
}
