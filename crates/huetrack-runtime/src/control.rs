//! Control commands from external listeners.
//!
//! Listener callbacks run on foreign threads, so they never touch camera
//! state directly. They push [`ControlCommand`]s through a
//! [`ControlHandle`] into a bounded queue the coordinator drains once at
//! the top of each cycle.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use huetrack_pipeline::PipelineSettings;

/// Queue capacity. Controllers send at human speed, so a full queue means
/// the coordinator has stalled.
pub const CONTROL_QUEUE_CAPACITY: usize = 64;

/// One requested reconfiguration.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Inbound `Pipeline` entry, e.g. `"pipeline2"`.
    SelectPipeline(String),
    /// Inbound `Driver_Mode` entry.
    SetDriverMode(bool),
    /// The camera the operator UI is watching changed.
    SetActiveCamera(String),
    /// Insert or replace a pipeline.
    ReplacePipeline {
        /// Target index.
        index: usize,
        /// New settings record.
        settings: Box<PipelineSettings>,
    },
    /// Remove a pipeline.
    RemovePipeline(usize),
}

/// Why a command was not queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The queue is at capacity.
    #[error("control queue is full")]
    Full,
    /// The coordinator has shut down.
    #[error("coordinator is no longer running")]
    Closed,
}

/// Sending side of the control queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Queue a command without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Full`] when the queue is at capacity and
    /// [`ControlError::Closed`] when the coordinator is gone.
    pub fn send(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.sender.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => ControlError::Full,
            TrySendError::Disconnected(_) => ControlError::Closed,
        })
    }

    /// Listener entry point for the inbound `Pipeline` key.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn select_pipeline(&self, entry: impl Into<String>) -> Result<(), ControlError> {
        self.send(ControlCommand::SelectPipeline(entry.into()))
    }

    /// Listener entry point for the inbound `Driver_Mode` key.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn set_driver_mode(&self, on: bool) -> Result<(), ControlError> {
        self.send(ControlCommand::SetDriverMode(on))
    }

    /// Listener entry point for UI camera changes.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn set_active_camera(&self, name: impl Into<String>) -> Result<(), ControlError> {
        self.send(ControlCommand::SetActiveCamera(name.into()))
    }
}

/// Receiving side, owned by the coordinator.
#[derive(Debug)]
pub struct ControlQueue {
    receiver: Receiver<ControlCommand>,
}

impl ControlQueue {
    /// Everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<ControlCommand> {
        self.receiver.try_iter().collect()
    }
}

/// Create a bounded control queue.
#[must_use]
pub fn control_queue() -> (ControlHandle, ControlQueue) {
    let (sender, receiver) = crossbeam_channel::bounded(CONTROL_QUEUE_CAPACITY);
    (ControlHandle { sender }, ControlQueue { receiver })
}
