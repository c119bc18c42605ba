//! Result publishing to the key/value table and the operator UI.
//!
//! The table is namespaced per camera and carries both the inbound
//! control keys (`Pipeline`, `Driver_Mode`) and the outbound result keys.
//! The UI channel receives a target message each cycle, but only for the
//! camera the operator is watching.

use std::collections::BTreeMap;
use std::sync::Arc;

use huetrack_pipeline::PipelineResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::selector::pipeline_entry;

/// Inbound: selected pipeline as `"pipeline<index>"`.
pub const KEY_PIPELINE: &str = "Pipeline";
/// Inbound: driver mode flag.
pub const KEY_DRIVER_MODE: &str = "Driver_Mode";
/// Outbound: target pitch in degrees.
pub const KEY_PITCH: &str = "Pitch";
/// Outbound: target yaw in degrees.
pub const KEY_YAW: &str = "Yaw";
/// Reserved for a range estimate; never written.
pub const KEY_DISTANCE: &str = "Distance";
/// Outbound: frame capture time in microseconds.
pub const KEY_TIMESTAMP: &str = "TimeStamp";
/// Outbound: whether a target was found.
pub const KEY_VALID: &str = "Valid";

/// A value stored in the key/value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValue {
    /// Boolean entry.
    Bool(bool),
    /// Numeric entry.
    Number(f64),
    /// String entry.
    String(String),
}

/// A camera's key/value namespace.
pub trait TelemetryTable {
    /// Write one entry.
    fn put(&mut self, key: &str, value: TableValue);
}

/// Numeric fields of a target message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiPoint {
    /// Pitch in degrees, 0 when invalid.
    pub pitch: f64,
    /// Yaw in degrees, 0 when invalid.
    pub yaw: f64,
    /// UI-facing FPS estimate.
    pub fps: f64,
}

/// Messages broadcast to operator UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UiMessage {
    /// Per-cycle target report.
    Target {
        /// Angles and FPS.
        point: UiPoint,
        /// Raw target center, `[0, 0]` when invalid.
        raw_point: [f64; 2],
    },
    /// The selected pipeline changed.
    CurrentPipeline {
        /// New current index.
        curr_pipeline: usize,
    },
}

/// Broadcast channel to operator UIs.
pub trait UiChannel {
    /// Send `message` to every connected UI.
    fn broadcast(&mut self, message: &UiMessage);

    /// Ask the UI layer to resend the complete settings document.
    fn send_full_settings(&mut self);
}

/// Writes results and control echoes for one camera.
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    camera: String,
}

impl ResultPublisher {
    /// A publisher for the camera named `camera`.
    #[must_use]
    pub fn new(camera: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
        }
    }

    /// Name of the camera this publisher reports for.
    #[must_use]
    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Seed the inbound keys at startup.
    pub fn publish_initial<T: TelemetryTable + ?Sized>(&self, table: &mut T, current: usize) {
        table.put(KEY_DRIVER_MODE, TableValue::Bool(false));
        table.put(KEY_PIPELINE, TableValue::String(pipeline_entry(current)));
    }

    /// Publish one cycle's result.
    ///
    /// `Valid` and `TimeStamp` are written every cycle; `Pitch` and `Yaw`
    /// only when valid, so consumers keep the last good angles. The UI
    /// message goes out only if `active_camera` is this camera.
    pub fn publish_result<T, U>(
        &self,
        table: &mut T,
        ui: &mut U,
        result: &PipelineResult,
        timestamp_micros: u64,
        ui_fps: f64,
        active_camera: &str,
    ) where
        T: TelemetryTable + ?Sized,
        U: UiChannel + ?Sized,
    {
        table.put(KEY_VALID, TableValue::Bool(result.valid));
        if result.valid {
            table.put(KEY_YAW, TableValue::Number(result.yaw));
            table.put(KEY_PITCH, TableValue::Number(result.pitch));
        }
        #[allow(clippy::cast_precision_loss)]
        table.put(KEY_TIMESTAMP, TableValue::Number(timestamp_micros as f64));

        if active_camera == self.camera {
            ui.broadcast(&target_message(result, ui_fps));
        }
    }

    /// Put the advertised selection back after a rejected request.
    pub fn publish_rejection<T: TelemetryTable + ?Sized>(&self, table: &mut T, current: usize) {
        table.put(KEY_PIPELINE, TableValue::String(pipeline_entry(current)));
    }

    /// Tell UIs about an applied switch and have them reload settings.
    pub fn announce_switch<U: UiChannel + ?Sized>(&self, ui: &mut U, index: usize) {
        ui.broadcast(&UiMessage::CurrentPipeline {
            curr_pipeline: index,
        });
        ui.send_full_settings();
    }
}

/// The per-cycle UI message for `result`.
#[must_use]
pub fn target_message(result: &PipelineResult, ui_fps: f64) -> UiMessage {
    let (pitch, yaw) = if result.valid {
        (result.pitch, result.yaw)
    } else {
        (0.0, 0.0)
    };
    UiMessage::Target {
        point: UiPoint {
            pitch,
            yaw,
            fps: ui_fps,
        },
        raw_point: result.raw_point(),
    }
}

/// In-memory table. Clones share storage, so a test can keep one clone
/// and hand another to the coordinator.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    entries: Arc<Mutex<BTreeMap<String, TableValue>>>,
    writes: Arc<Mutex<Vec<(String, TableValue)>>>,
}

impl MemoryTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<TableValue> {
        self.entries.lock().get(key).cloned()
    }

    /// Every write so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, TableValue)> {
        self.writes.lock().clone()
    }

    /// Forget the write log, keeping current values.
    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

impl TelemetryTable for MemoryTable {
    fn put(&mut self, key: &str, value: TableValue) {
        self.entries.lock().insert(key.to_string(), value.clone());
        self.writes.lock().push((key.to_string(), value));
    }
}

/// Something a [`MemoryUi`] received.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A broadcast message.
    Message(UiMessage),
    /// A full-settings resend request.
    FullSettings,
}

/// In-memory UI channel. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryUi {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl MemoryUi {
    /// An empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything received so far.
    pub fn drain(&self) -> Vec<UiEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl UiChannel for MemoryUi {
    fn broadcast(&mut self, message: &UiMessage) {
        self.events.lock().push(UiEvent::Message(message.clone()));
    }

    fn send_full_settings(&mut self) {
        self.events.lock().push(UiEvent::FullSettings);
    }
}
