//! huetrack-runtime: drives the vision stages once per admitted frame.
//!
//! A capture thread feeds a [`FrameSlot`]; a [`PipelineCoordinator`]
//! gates cycles with a [`FrameScheduler`], applies queued
//! [`ControlCommand`]s, runs `huetrack-pipeline` on the newest frame and
//! publishes through a [`ResultPublisher`]. Camera devices, telemetry
//! tables and UI channels are traits so the coordinator can run against
//! real hardware or the in-memory implementations used by the CLI and
//! tests.

pub mod camera;
pub mod control;
pub mod coordinator;
pub mod frame;
pub mod mode;
pub mod publish;
pub mod scheduler;
pub mod selector;
pub mod settings;

pub use camera::{Camera, CameraDevice, CameraError, DeviceError, NullDevice, VideoMode};
pub use control::{
    CONTROL_QUEUE_CAPACITY, ControlCommand, ControlError, ControlHandle, ControlQueue,
    control_queue,
};
pub use coordinator::{CycleOutcome, POLL_INTERVAL, PipelineCoordinator, RunLimits, Sinks};
pub use frame::{
    CaptureError, CapturedFrame, DisplaySlot, FrameSlot, FrameSource, OutputSink, StopSignal,
    spawn_capture,
};
pub use mode::{DRIVER_BRIGHTNESS, DRIVER_EXPOSURE, LiveExposure, Mode, ModeController};
pub use publish::{
    KEY_DISTANCE, KEY_DRIVER_MODE, KEY_PIPELINE, KEY_PITCH, KEY_TIMESTAMP, KEY_VALID, KEY_YAW,
    MemoryTable, MemoryUi, ResultPublisher, TableValue, TelemetryTable, UiChannel, UiEvent,
    UiMessage, UiPoint,
};
pub use scheduler::FrameScheduler;
pub use selector::{PipelineSelector, SwitchOutcome, parse_pipeline_entry, pipeline_entry};
pub use settings::{CameraConfig, SettingsError, SettingsStore};
