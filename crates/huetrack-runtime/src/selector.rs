//! Externally requested pipeline switches.
//!
//! Controllers name pipelines as `"pipeline<index>"`. A request for an
//! index in the camera's mapping selects it and pushes the new live
//! exposure to the device; anything else is rejected and the caller
//! re-advertises the current selection.

use tracing::{info, warn};

use crate::camera::{Camera, CameraDevice};
use crate::mode::ModeController;

/// Prefix of the pipeline entry string.
const ENTRY_PREFIX: &str = "pipeline";

/// Parse `"pipeline<n>"` into `n`.
///
/// Only the form [`pipeline_entry`] writes is accepted: no whitespace and
/// no leading zeros.
#[must_use]
pub fn parse_pipeline_entry(entry: &str) -> Option<usize> {
    let digits = entry.strip_prefix(ENTRY_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// The canonical entry string for `index`.
#[must_use]
pub fn pipeline_entry(index: usize) -> String {
    format!("{ENTRY_PREFIX}{index}")
}

/// Result of a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The requested pipeline is now current.
    Applied {
        /// The new current index.
        index: usize,
    },
    /// The request named no existing pipeline; nothing changed.
    Rejected {
        /// The unchanged current index.
        current: usize,
    },
}

/// Applies pipeline switch requests to a camera and its device.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSelector;

impl PipelineSelector {
    /// Handle a raw `"pipeline<n>"` request.
    ///
    /// Unparsable strings are rejected like missing indices.
    pub fn request_entry<D: CameraDevice + ?Sized>(
        self,
        camera: &mut Camera,
        device: &mut D,
        modes: &ModeController,
        entry: &str,
    ) -> SwitchOutcome {
        match parse_pipeline_entry(entry) {
            Some(index) => self.request_switch(camera, device, modes, index),
            None => {
                warn!(camera = camera.name(), entry, "unparsable pipeline request");
                SwitchOutcome::Rejected {
                    current: camera.current_index(),
                }
            }
        }
    }

    /// Switch `camera` to pipeline `requested`.
    ///
    /// On success the device receives the new pipeline's exposure and
    /// brightness, or the driver override while in driver mode. A device
    /// failure is logged and does not undo the switch.
    pub fn request_switch<D: CameraDevice + ?Sized>(
        self,
        camera: &mut Camera,
        device: &mut D,
        modes: &ModeController,
        requested: usize,
    ) -> SwitchOutcome {
        if camera.select(requested).is_err() {
            warn!(
                camera = camera.name(),
                requested,
                current = camera.current_index(),
                "rejected request for missing pipeline"
            );
            return SwitchOutcome::Rejected {
                current: camera.current_index(),
            };
        }

        let settings = camera.current_pipeline();
        if let Err(err) = modes.live_exposure(&settings).apply(device) {
            warn!(camera = camera.name(), error = %err, "device rejected pipeline exposure");
        }
        info!(
            camera = camera.name(),
            index = requested,
            nickname = %settings.nickname,
            "switched pipeline"
        );
        SwitchOutcome::Applied { index: requested }
    }
}
