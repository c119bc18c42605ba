//! The per-frame cycle: gate, reconfigure, process, publish.
//!
//! One [`PipelineCoordinator`] drives one camera. Each admitted cycle:
//!
//! 1. refreshes the UI FPS estimate,
//! 2. drains the control queue (pipeline switches, driver mode, active
//!    camera, pipeline edits),
//! 3. snapshots the current pipeline settings,
//! 4. takes the newest frame, skipping the cycle if there is none,
//! 5. runs the vision stages (or the driver passthrough),
//! 6. publishes the result and streams the display image,
//! 7. records the cycle end for the rate gate.
//!
//! Everything a cycle allocates is owned by that cycle and dropped before
//! the next one starts.

use std::thread;

use huetrack_pipeline::{DefaultStageRunner, PipelineResult, Stage, StageRunner};
use tracing::{debug, info, trace, warn};
use web_time::{Duration, Instant};

use crate::camera::{Camera, CameraDevice};
use crate::control::{ControlCommand, ControlQueue};
use crate::frame::{FrameSlot, OutputSink, StopSignal};
use crate::mode::{Mode, ModeController};
use crate::publish::{ResultPublisher, TelemetryTable, UiChannel};
use crate::scheduler::FrameScheduler;
use crate::selector::{PipelineSelector, SwitchOutcome};

/// Longest single sleep while waiting for the gate or a frame.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What one call to [`PipelineCoordinator::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// The rate gate is closed for this much longer.
    NotDue {
        /// Remaining wait.
        wait: Duration,
    },
    /// No usable frame was waiting; nothing was published.
    Skipped,
    /// Driver mode streamed the frame; an invalid result was published.
    Driver,
    /// The vision stages ran and the result was published.
    Processed {
        /// Whether a target was found.
        valid: bool,
        /// Where the stage chain stopped, if it stopped early.
        stopped_at: Option<Stage>,
    },
}

impl CycleOutcome {
    /// Whether the cycle published a result.
    #[must_use]
    pub const fn published(&self) -> bool {
        matches!(self, Self::Driver | Self::Processed { .. })
    }
}

/// When [`PipelineCoordinator::run`] should return on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Stop after this many published cycles.
    pub max_cycles: Option<u64>,
    /// Stop after going this long without a frame.
    pub idle_timeout: Option<Duration>,
}

/// Output side of a coordinator: telemetry table, UI channel and display
/// stream.
#[derive(Debug, Clone)]
pub struct Sinks<T, U, O> {
    /// Key/value table for this camera.
    pub table: T,
    /// Operator UI broadcast channel.
    pub ui: U,
    /// Display image stream.
    pub output: O,
}

/// Drives the per-frame cycle for one camera.
#[derive(Debug)]
pub struct PipelineCoordinator<D, T, U, O, R = DefaultStageRunner> {
    camera: Camera,
    device: D,
    sinks: Sinks<T, U, O>,
    runner: R,
    frames: FrameSlot,
    control: ControlQueue,
    scheduler: FrameScheduler,
    selector: PipelineSelector,
    modes: ModeController,
    publisher: ResultPublisher,
    active_camera: String,
}

impl<D, T, U, O> PipelineCoordinator<D, T, U, O>
where
    D: CameraDevice,
    T: TelemetryTable,
    U: UiChannel,
    O: OutputSink,
{
    /// A coordinator using the built-in stage implementations. The
    /// target rate comes from the device's video mode and the camera
    /// starts out as the active one.
    pub fn new(
        camera: Camera,
        device: D,
        sinks: Sinks<T, U, O>,
        frames: FrameSlot,
        control: ControlQueue,
    ) -> Self {
        Self::with_runner(
            camera,
            device,
            sinks,
            frames,
            control,
            DefaultStageRunner::default(),
        )
    }
}

impl<D, T, U, O, R> PipelineCoordinator<D, T, U, O, R>
where
    D: CameraDevice,
    T: TelemetryTable,
    U: UiChannel,
    O: OutputSink,
    R: StageRunner,
{
    /// A coordinator using `runner` for the vision stages.
    pub fn with_runner(
        camera: Camera,
        device: D,
        sinks: Sinks<T, U, O>,
        frames: FrameSlot,
        control: ControlQueue,
        runner: R,
    ) -> Self {
        let scheduler = FrameScheduler::new(device.video_mode().fps);
        let publisher = ResultPublisher::new(camera.name());
        let active_camera = camera.name().to_string();
        Self {
            camera,
            device,
            sinks,
            runner,
            frames,
            control,
            scheduler,
            selector: PipelineSelector,
            modes: ModeController::default(),
            publisher,
            active_camera,
        }
    }

    /// The camera being driven.
    #[must_use]
    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The camera device.
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The stage implementations.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// The output sinks.
    #[must_use]
    pub const fn sinks(&self) -> &Sinks<T, U, O> {
        &self.sinks
    }

    /// The rate gate.
    #[must_use]
    pub const fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Current processing mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.modes.mode()
    }

    /// The camera the operator UI is watching.
    #[must_use]
    pub fn active_camera(&self) -> &str {
        &self.active_camera
    }

    /// Replace the rate gate, e.g. to override the device's frame rate.
    pub fn set_scheduler(&mut self, scheduler: FrameScheduler) {
        self.scheduler = scheduler;
    }

    /// Seed the inbound table keys and put the current pipeline's exposure
    /// and brightness on the device.
    pub fn start(&mut self) {
        let settings = self.camera.current_pipeline();
        self.publisher
            .publish_initial(&mut self.sinks.table, self.camera.current_index());
        if let Err(err) = self.modes.live_exposure(&settings).apply(&mut self.device) {
            warn!(camera = self.camera.name(), error = %err, "device rejected startup exposure");
        }
        info!(
            camera = self.camera.name(),
            pipeline = self.camera.current_index(),
            target_fps = self.scheduler.target_fps(),
            "coordinator started"
        );
    }

    /// Run one cycle if the rate gate admits it at `now`.
    pub fn poll(&mut self, now: Instant) -> CycleOutcome {
        if !self.scheduler.should_admit(now) {
            return CycleOutcome::NotDue {
                wait: self.scheduler.time_until_admit(now),
            };
        }
        self.run_cycle(now)
    }

    /// Run one cycle now, bypassing the rate gate.
    pub fn run_cycle(&mut self, start: Instant) -> CycleOutcome {
        self.scheduler.begin_cycle(start);
        self.apply_commands();
        let settings = self.camera.current_pipeline();

        let Some(frame) = self.frames.take() else {
            return CycleOutcome::Skipped;
        };
        let timestamp = frame.timestamp_micros();

        let (result, display, outcome) = if self.modes.is_driver() {
            match huetrack_pipeline::driver_frame(settings.orientation, frame.image) {
                Ok(display) => (PipelineResult::invalid(), display, CycleOutcome::Driver),
                Err(e) => {
                    debug!(camera = self.camera.name(), error = %e, "skipping driver frame");
                    return CycleOutcome::Skipped;
                }
            }
        } else {
            match huetrack_pipeline::process(
                &self.runner,
                &settings,
                self.camera.values(),
                frame.image,
            ) {
                Ok(output) => {
                    trace!(
                        camera = self.camera.name(),
                        found = output.counts.found,
                        filtered = output.counts.filtered,
                        grouped = output.counts.grouped,
                        "stage counts"
                    );
                    let outcome = CycleOutcome::Processed {
                        valid: output.result.valid,
                        stopped_at: output.stopped_at,
                    };
                    (output.result, output.display, outcome)
                }
                Err(e) => {
                    debug!(camera = self.camera.name(), error = %e, "skipping frame");
                    return CycleOutcome::Skipped;
                }
            }
        };

        self.publisher.publish_result(
            &mut self.sinks.table,
            &mut self.sinks.ui,
            &result,
            timestamp,
            self.scheduler.ui_fps(),
            &self.active_camera,
        );
        self.sinks.output.submit(display);

        let end = Instant::now();
        self.scheduler.finish_cycle(start, end);
        debug!(
            camera = self.camera.name(),
            valid = result.valid,
            pitch = result.pitch,
            yaw = result.yaw,
            fps = self.scheduler.fps(),
            "cycle published"
        );
        outcome
    }

    /// Apply every queued control command, oldest first.
    pub fn apply_commands(&mut self) {
        for command in self.control.drain() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SelectPipeline(entry) => {
                let outcome = self.selector.request_entry(
                    &mut self.camera,
                    &mut self.device,
                    &self.modes,
                    &entry,
                );
                match outcome {
                    SwitchOutcome::Applied { index } => {
                        self.publisher.announce_switch(&mut self.sinks.ui, index);
                    }
                    SwitchOutcome::Rejected { current } => {
                        self.publisher
                            .publish_rejection(&mut self.sinks.table, current);
                    }
                }
            }
            ControlCommand::SetDriverMode(on) => {
                let mode = if on { Mode::Driver } else { Mode::Vision };
                let settings = self.camera.current_pipeline();
                match self.modes.set_mode(mode, &mut self.device, &settings) {
                    Ok(true) => info!(camera = self.camera.name(), ?mode, "mode changed"),
                    Ok(false) => {}
                    Err(err) => warn!(
                        camera = self.camera.name(),
                        ?mode,
                        error = %err,
                        "device rejected mode exposure"
                    ),
                }
            }
            ControlCommand::SetActiveCamera(name) => {
                debug!(camera = self.camera.name(), active = %name, "active camera changed");
                self.active_camera = name;
            }
            ControlCommand::ReplacePipeline { index, settings } => {
                match self.camera.replace_pipeline(index, *settings) {
                    Ok(()) if index == self.camera.current_index() => {
                        let settings = self.camera.current_pipeline();
                        let exposure = self.modes.live_exposure(&settings);
                        if let Err(err) = exposure.apply(&mut self.device) {
                            warn!(
                                camera = self.camera.name(),
                                error = %err,
                                "device rejected pipeline exposure"
                            );
                        }
                    }
                    Ok(()) => {}
                    Err(err) => {
                        warn!(
                            camera = self.camera.name(),
                            index,
                            error = %err,
                            "pipeline edit rejected"
                        );
                    }
                }
            }
            ControlCommand::RemovePipeline(index) => {
                if let Err(err) = self.camera.remove_pipeline(index) {
                    warn!(
                        camera = self.camera.name(),
                        index,
                        error = %err,
                        "pipeline removal rejected"
                    );
                }
            }
        }
    }

    /// Loop until `stop` fires or a limit is reached. Returns the number
    /// of published cycles.
    ///
    /// Never sleeps longer than [`POLL_INTERVAL`] at a time, so a stop
    /// request is noticed within about a millisecond.
    pub fn run(&mut self, stop: &StopSignal, limits: RunLimits) -> u64 {
        let mut published = 0_u64;
        let mut last_frame = Instant::now();
        while !stop.is_stopped() {
            let now = Instant::now();
            match self.poll(now) {
                CycleOutcome::NotDue { wait } => thread::sleep(wait.min(POLL_INTERVAL)),
                CycleOutcome::Skipped => {
                    if limits
                        .idle_timeout
                        .is_some_and(|timeout| now.saturating_duration_since(last_frame) >= timeout)
                    {
                        info!(camera = self.camera.name(), "no frames, stopping");
                        break;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                CycleOutcome::Driver | CycleOutcome::Processed { .. } => {
                    published += 1;
                    last_frame = now;
                    if limits.max_cycles.is_some_and(|max| published >= max) {
                        break;
                    }
                }
            }
        }
        info!(camera = self.camera.name(), published, "coordinator stopped");
        published
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use huetrack_pipeline::{Hsv, PipelineSettings, RgbImage};

    use super::*;
    use crate::camera::{NullDevice, VideoMode};
    use crate::control::{ControlHandle, control_queue};
    use crate::frame::{CapturedFrame, DisplaySlot};
    use crate::mode::{DRIVER_BRIGHTNESS, DRIVER_EXPOSURE};
    use crate::publish::{KEY_PIPELINE, KEY_VALID, MemoryTable, MemoryUi, TableValue, UiEvent};

    type TestCoordinator = PipelineCoordinator<NullDevice, MemoryTable, MemoryUi, DisplaySlot>;

    struct Harness {
        coordinator: TestCoordinator,
        control: ControlHandle,
        frames: FrameSlot,
        table: MemoryTable,
        ui: MemoryUi,
        display: DisplaySlot,
    }

    fn harness() -> Harness {
        let pipelines = BTreeMap::from([
            (
                0,
                PipelineSettings {
                    exposure: 10.0,
                    brightness: 11.0,
                    hsv_lower: Hsv::new(50, 100, 100),
                    hsv_upper: Hsv::new(70, 255, 255),
                    ..PipelineSettings::default()
                },
            ),
            (1, PipelineSettings::default()),
            (
                2,
                PipelineSettings {
                    exposure: 30.0,
                    brightness: 31.0,
                    ..PipelineSettings::default()
                },
            ),
        ]);
        let mode = VideoMode {
            width: 32,
            height: 24,
            fps: 30,
        };
        let camera = Camera::new("cam", mode, 60.0, pipelines, 0).unwrap();
        let (control, queue) = control_queue();
        let frames = FrameSlot::new();
        let table = MemoryTable::new();
        let ui = MemoryUi::new();
        let display = DisplaySlot::new();
        let coordinator = PipelineCoordinator::new(
            camera,
            NullDevice::new(mode),
            Sinks {
                table: table.clone(),
                ui: ui.clone(),
                output: display.clone(),
            },
            frames.clone(),
            queue,
        );
        Harness {
            coordinator,
            control,
            frames,
            table,
            ui,
            display,
        }
    }

    fn green_frame() -> CapturedFrame {
        let mut image = RgbImage::new(32, 24);
        for y in 4..10 {
            for x in 20..28 {
                image.put_pixel(x, y, image::Rgb([0, 255, 0]));
            }
        }
        CapturedFrame {
            image,
            captured_at: Duration::from_micros(42),
        }
    }

    #[test]
    fn start_seeds_table_and_device() {
        let mut h = harness();
        h.coordinator.start();
        assert_eq!(
            h.table.get(KEY_PIPELINE),
            Some(TableValue::String("pipeline0".to_string()))
        );
        assert_eq!(h.coordinator.device().exposure(), Some(10.0));
    }

    #[test]
    fn missing_frame_skips_without_publishing() {
        let mut h = harness();
        let outcome = h.coordinator.poll(Instant::now());
        assert_eq!(outcome, CycleOutcome::Skipped);
        assert!(h.table.writes().is_empty());
        // A skipped cycle does not close the gate.
        assert!(h.coordinator.scheduler().should_admit(Instant::now()));
    }

    #[test]
    fn zero_sized_frame_is_skipped() {
        let mut h = harness();
        h.frames.put(CapturedFrame {
            image: RgbImage::new(0, 0),
            captured_at: Duration::ZERO,
        });
        assert_eq!(h.coordinator.poll(Instant::now()), CycleOutcome::Skipped);
        assert!(h.display.take().is_none());
        assert!(h.table.get(KEY_VALID).is_none());
    }

    #[test]
    fn zero_sized_frame_is_skipped_in_driver_mode() {
        let mut h = harness();
        h.control.set_driver_mode(true).unwrap();
        h.frames.put(CapturedFrame {
            image: RgbImage::new(4, 0),
            captured_at: Duration::ZERO,
        });
        assert_eq!(h.coordinator.poll(Instant::now()), CycleOutcome::Skipped);
        assert_eq!(h.coordinator.mode(), Mode::Driver);
        assert!(h.display.take().is_none());
        assert!(h.table.get(KEY_VALID).is_none());
        assert!(h.coordinator.scheduler().should_admit(Instant::now()));
    }

    #[test]
    fn frame_is_processed_and_published() {
        let mut h = harness();
        h.frames.put(green_frame());
        let outcome = h.coordinator.poll(Instant::now());
        assert_eq!(
            outcome,
            CycleOutcome::Processed {
                valid: true,
                stopped_at: None
            }
        );
        assert_eq!(h.table.get(KEY_VALID), Some(TableValue::Bool(true)));
        assert_eq!(h.ui.events().len(), 1);
        assert!(h.display.take().is_some());
    }

    #[test]
    fn gate_rejects_immediate_second_cycle() {
        let mut h = harness();
        h.frames.put(green_frame());
        let t0 = Instant::now();
        assert!(h.coordinator.poll(t0).published());
        h.frames.put(green_frame());
        let outcome = h.coordinator.poll(Instant::now());
        assert!(matches!(outcome, CycleOutcome::NotDue { .. }));
    }

    #[test]
    fn switch_command_applies_before_processing() {
        let mut h = harness();
        h.control.select_pipeline("pipeline2").unwrap();
        h.frames.put(green_frame());
        let outcome = h.coordinator.poll(Instant::now());

        assert_eq!(h.coordinator.camera().current_index(), 2);
        assert_eq!(h.coordinator.device().exposure(), Some(30.0));
        assert_eq!(h.coordinator.device().brightness(), Some(31.0));
        // Pipeline 2 has the full HSV range, so the whole frame is one blob.
        assert!(outcome.published());

        let events = h.ui.events();
        assert!(matches!(&events[0], UiEvent::Message(m)
            if serde_json::to_value(m).unwrap() == serde_json::json!({ "curr_pipeline": 2 })));
        assert_eq!(events[1], UiEvent::FullSettings);
    }

    #[test]
    fn rejected_switch_restores_entry() {
        let mut h = harness();
        h.control.select_pipeline("pipeline7").unwrap();
        h.coordinator.apply_commands();
        assert_eq!(h.coordinator.camera().current_index(), 0);
        assert_eq!(
            h.table.get(KEY_PIPELINE),
            Some(TableValue::String("pipeline0".to_string()))
        );
        assert!(h.ui.events().is_empty());
    }

    #[test]
    fn driver_mode_streams_frame_and_publishes_invalid() {
        let mut h = harness();
        h.control.set_driver_mode(true).unwrap();
        let frame = green_frame();
        h.frames.put(frame.clone());
        assert_eq!(h.coordinator.poll(Instant::now()), CycleOutcome::Driver);
        assert_eq!(h.coordinator.device().exposure(), Some(DRIVER_EXPOSURE));
        assert_eq!(h.coordinator.device().brightness(), Some(DRIVER_BRIGHTNESS));
        assert_eq!(h.table.get(KEY_VALID), Some(TableValue::Bool(false)));
        assert_eq!(h.display.take(), Some(frame.image));
    }

    #[test]
    fn inactive_camera_gets_no_ui_message() {
        let mut h = harness();
        h.control.set_active_camera("other").unwrap();
        h.frames.put(green_frame());
        assert!(h.coordinator.poll(Instant::now()).published());
        assert_eq!(h.coordinator.active_camera(), "other");
        assert!(h.ui.events().is_empty());
        assert_eq!(h.table.get(KEY_VALID), Some(TableValue::Bool(true)));
    }

    #[test]
    fn editing_current_pipeline_updates_device() {
        let mut h = harness();
        h.control
            .send(ControlCommand::ReplacePipeline {
                index: 0,
                settings: Box::new(PipelineSettings {
                    exposure: 77.0,
                    ..PipelineSettings::default()
                }),
            })
            .unwrap();
        h.coordinator.apply_commands();
        assert_eq!(h.coordinator.device().exposure(), Some(77.0));
    }

    #[test]
    fn removing_current_pipeline_is_refused() {
        let mut h = harness();
        h.control.send(ControlCommand::RemovePipeline(0)).unwrap();
        h.control.send(ControlCommand::RemovePipeline(1)).unwrap();
        h.coordinator.apply_commands();
        assert!(h.coordinator.camera().pipeline(0).is_some());
        assert!(h.coordinator.camera().pipeline(1).is_none());
    }

    #[test]
    fn run_honours_cycle_limit_and_stop() {
        let mut h = harness();
        h.frames.put(green_frame());
        let limits = RunLimits {
            max_cycles: Some(1),
            idle_timeout: None,
        };
        assert_eq!(h.coordinator.run(&StopSignal::new(), limits), 1);

        let stop = StopSignal::new();
        stop.stop();
        assert_eq!(h.coordinator.run(&stop, RunLimits::default()), 0);
    }

    #[test]
    fn run_stops_when_idle() {
        let mut h = harness();
        let limits = RunLimits {
            max_cycles: None,
            idle_timeout: Some(Duration::from_millis(5)),
        };
        assert_eq!(h.coordinator.run(&StopSignal::new(), limits), 0);
    }
}
