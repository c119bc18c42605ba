//! Integration test: a capture thread feeding a coordinator, with control
//! commands arriving between frames.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::Cell;
use std::collections::BTreeMap;

use huetrack_pipeline::{
    Candidate, DefaultStageRunner, Dimensions, GrayImage, GroupPolicy, Hsv, IntersectionPolicy,
    PipelineSettings, Range, Region, RgbImage, SortMode, Stage, StageRunner,
};
use huetrack_runtime::{
    Camera, CameraDevice, CaptureError, CycleOutcome, DRIVER_BRIGHTNESS, DRIVER_EXPOSURE,
    DeviceError, DisplaySlot, FrameScheduler, FrameSlot, FrameSource, KEY_PITCH, KEY_TIMESTAMP,
    KEY_VALID, KEY_YAW, MemoryTable, MemoryUi, Mode, NullDevice, PipelineCoordinator, RunLimits,
    Sinks, StopSignal, TableValue, UiEvent, VideoMode, control_queue, spawn_capture,
};
use web_time::{Duration, Instant};

const MODE: VideoMode = VideoMode {
    width: 64,
    height: 48,
    fps: 30,
};

fn settings(exposure: f64, lower: Hsv, upper: Hsv) -> PipelineSettings {
    PipelineSettings {
        exposure,
        brightness: exposure + 1.0,
        hsv_lower: lower,
        hsv_upper: upper,
        ..PipelineSettings::default()
    }
}

/// Pipeline 0 tracks green, 1 tracks blue, 2 is a second green pipeline
/// with its own exposure.
fn camera() -> Camera {
    let green = (Hsv::new(50, 100, 100), Hsv::new(70, 255, 255));
    let blue = (Hsv::new(110, 100, 100), Hsv::new(130, 255, 255));
    let pipelines = BTreeMap::from([
        (0, settings(10.0, green.0, green.1)),
        (1, settings(20.0, blue.0, blue.1)),
        (2, settings(30.0, green.0, green.1)),
    ]);
    Camera::new("front", MODE, 60.8, pipelines, 0).unwrap()
}

fn green_square() -> RgbImage {
    let mut image = RgbImage::new(MODE.width, MODE.height);
    for y in 30..40 {
        for x in 40..50 {
            image.put_pixel(x, y, image::Rgb([0, 255, 0]));
        }
    }
    image
}

/// Replays a fixed list of frames, then ends.
struct Replay {
    frames: Vec<RgbImage>,
}

impl FrameSource for Replay {
    fn name(&self) -> &str {
        "replay"
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        Ok(self.frames.pop())
    }
}

#[test]
fn captured_frames_are_processed_and_published() {
    let (_control, queue) = control_queue();
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let ui = MemoryUi::new();
    let display = DisplaySlot::new();
    let mut coordinator = PipelineCoordinator::new(
        camera(),
        NullDevice::new(MODE),
        Sinks {
            table: table.clone(),
            ui: ui.clone(),
            output: display.clone(),
        },
        frames.clone(),
        queue,
    );
    coordinator.start();

    let stop = StopSignal::new();
    let capture = spawn_capture(
        Replay {
            frames: vec![green_square(); 3],
        },
        frames,
        stop.clone(),
        Duration::from_millis(40),
    )
    .unwrap();

    let published = coordinator.run(
        &stop,
        RunLimits {
            max_cycles: None,
            idle_timeout: Some(Duration::from_millis(500)),
        },
    );
    assert_eq!(capture.join().unwrap(), 3);
    assert!(published >= 1, "no cycle published");

    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(true)));
    // Target sits right of and below center.
    let Some(TableValue::Number(yaw)) = table.get(KEY_YAW) else {
        panic!("yaw not published");
    };
    let Some(TableValue::Number(pitch)) = table.get(KEY_PITCH) else {
        panic!("pitch not published");
    };
    assert!(yaw > 0.0, "{yaw}");
    assert!(pitch < 0.0, "{pitch}");
    assert!(matches!(table.get(KEY_TIMESTAMP), Some(TableValue::Number(_))));

    assert!(!ui.events().is_empty());
    let streamed = display.take().unwrap();
    assert_eq!(Dimensions::of(&streamed), MODE.dimensions());
}

#[test]
fn switch_then_driver_round_trip_restores_new_pipeline_values() {
    let (control, queue) = control_queue();
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let ui = MemoryUi::new();
    let mut coordinator = PipelineCoordinator::new(
        camera(),
        NullDevice::new(MODE),
        Sinks {
            table: table.clone(),
            ui: ui.clone(),
            output: DisplaySlot::new(),
        },
        frames.clone(),
        queue,
    );
    coordinator.start();
    let t0 = Instant::now();

    control.select_pipeline("pipeline2").unwrap();
    control.set_driver_mode(true).unwrap();
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    assert_eq!(coordinator.run_cycle(t0), CycleOutcome::Driver);
    assert_eq!(coordinator.camera().current_index(), 2);
    assert_eq!(coordinator.device().exposure(), Some(DRIVER_EXPOSURE));
    assert_eq!(coordinator.device().brightness(), Some(DRIVER_BRIGHTNESS));
    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(false)));

    control.set_driver_mode(false).unwrap();
    coordinator.apply_commands();
    assert_eq!(coordinator.device().exposure(), Some(30.0));
    assert_eq!(coordinator.device().brightness(), Some(31.0));

    // One switch announcement: pipeline message, then full settings. Then
    // the driver-mode target message.
    let events = ui.drain();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], UiEvent::FullSettings);
}

/// Refuses every value, remembering what it was asked for.
#[derive(Default)]
struct Refusing {
    exposures: Vec<f64>,
    brightnesses: Vec<f64>,
}

impl CameraDevice for Refusing {
    fn video_mode(&self) -> VideoMode {
        MODE
    }

    fn set_exposure(&mut self, exposure: f64) -> Result<(), DeviceError> {
        self.exposures.push(exposure);
        Err(DeviceError::ExposureSetFailure(exposure))
    }

    fn set_brightness(&mut self, brightness: f64) -> Result<(), DeviceError> {
        self.brightnesses.push(brightness);
        Err(DeviceError::BrightnessSetFailure(brightness))
    }
}

#[test]
fn refusing_device_does_not_block_switch_or_driver_mode() {
    let (control, queue) = control_queue();
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let ui = MemoryUi::new();
    let mut coordinator = PipelineCoordinator::new(
        camera(),
        Refusing::default(),
        Sinks {
            table: table.clone(),
            ui: ui.clone(),
            output: DisplaySlot::new(),
        },
        frames.clone(),
        queue,
    );
    coordinator.start();

    control.select_pipeline("pipeline2").unwrap();
    control.set_driver_mode(true).unwrap();
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    assert_eq!(coordinator.run_cycle(Instant::now()), CycleOutcome::Driver);
    assert_eq!(coordinator.camera().current_index(), 2);
    assert_eq!(coordinator.mode(), Mode::Driver);
    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(false)));
    assert_eq!(ui.events().len(), 3);

    // Startup, the switch, then driver mode: every value was still tried.
    let device = coordinator.device();
    assert_eq!(device.exposures, vec![10.0, 30.0, DRIVER_EXPOSURE]);
    assert_eq!(device.brightnesses, vec![11.0, 31.0, DRIVER_BRIGHTNESS]);
}

#[test]
fn wrong_color_pipeline_reports_no_target() {
    let (control, queue) = control_queue();
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let mut coordinator = PipelineCoordinator::new(
        camera(),
        NullDevice::new(MODE),
        Sinks {
            table: table.clone(),
            ui: MemoryUi::new(),
            output: DisplaySlot::new(),
        },
        frames.clone(),
        queue,
    );

    control.select_pipeline("pipeline1").unwrap();
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    assert_eq!(
        coordinator.run_cycle(Instant::now()),
        CycleOutcome::Processed {
            valid: false,
            stopped_at: Some(Stage::Extract),
        }
    );
    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(false)));
    assert_eq!(table.get(KEY_YAW), None);
}

/// Delegates to the built-in stages, counting how many were reached.
#[derive(Default)]
struct Counting {
    inner: DefaultStageRunner,
    extract_yields_nothing: bool,
    filtered: Cell<u32>,
    grouped: Cell<u32>,
    selected: Cell<u32>,
}

impl StageRunner for Counting {
    fn threshold(
        &self,
        frame: &RgbImage,
        lower: Hsv,
        upper: Hsv,
        erode: bool,
        dilate: bool,
    ) -> GrayImage {
        self.inner.threshold(frame, lower, upper, erode, dilate)
    }

    fn extract_shapes(&self, mask: &GrayImage) -> Vec<Candidate> {
        if self.extract_yields_nothing {
            Vec::new()
        } else {
            self.inner.extract_shapes(mask)
        }
    }

    fn filter_shapes(
        &self,
        candidates: Vec<Candidate>,
        area: Range,
        ratio: Range,
        extent: Range,
        frame: Dimensions,
    ) -> Vec<Candidate> {
        self.filtered.set(self.filtered.get() + 1);
        self.inner
            .filter_shapes(candidates, area, ratio, extent, frame)
    }

    fn group_shapes(
        &self,
        filtered: &[Candidate],
        intersection: IntersectionPolicy,
        group: GroupPolicy,
    ) -> Vec<Region> {
        self.grouped.set(self.grouped.get() + 1);
        self.inner.group_shapes(filtered, intersection, group)
    }

    fn select_target(
        &self,
        grouped: &[Region],
        sort: SortMode,
        frame: Dimensions,
    ) -> Option<Region> {
        self.selected.set(self.selected.get() + 1);
        self.inner.select_target(grouped, sort, frame)
    }
}

fn counting_coordinator(
    runner: Counting,
    frames: &FrameSlot,
    table: &MemoryTable,
) -> PipelineCoordinator<NullDevice, MemoryTable, MemoryUi, DisplaySlot, Counting> {
    let (_control, queue) = control_queue();
    PipelineCoordinator::with_runner(
        camera(),
        NullDevice::new(MODE),
        Sinks {
            table: table.clone(),
            ui: MemoryUi::new(),
            output: DisplaySlot::new(),
        },
        frames.clone(),
        queue,
        runner,
    )
}

#[test]
fn empty_extraction_skips_later_stages() {
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let mut coordinator = counting_coordinator(
        Counting {
            extract_yields_nothing: true,
            ..Counting::default()
        },
        &frames,
        &table,
    );
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    let outcome = coordinator.run_cycle(Instant::now());
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            valid: false,
            stopped_at: Some(Stage::Extract),
        }
    );
    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(false)));
    let runner = coordinator.runner();
    assert_eq!(runner.filtered.get(), 0);
    assert_eq!(runner.grouped.get(), 0);
    assert_eq!(runner.selected.get(), 0);
}

#[test]
fn every_stage_runs_for_a_visible_target() {
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let mut coordinator = counting_coordinator(Counting::default(), &frames, &table);
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    assert!(coordinator.run_cycle(Instant::now()).published());
    assert_eq!(table.get(KEY_VALID), Some(TableValue::Bool(true)));
    let runner = coordinator.runner();
    assert_eq!(runner.filtered.get(), 1);
    assert_eq!(runner.grouped.get(), 1);
    assert_eq!(runner.selected.get(), 1);
}

#[test]
fn scheduler_override_sets_rate() {
    let frames = FrameSlot::new();
    let table = MemoryTable::new();
    let mut coordinator = counting_coordinator(Counting::default(), &frames, &table);
    coordinator.set_scheduler(FrameScheduler::new(10));
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    let t0 = Instant::now();
    assert!(coordinator.poll(t0).published());
    frames.put(huetrack_runtime::CapturedFrame {
        image: green_square(),
        captured_at: Duration::ZERO,
    });
    // 100 ms period: still closed 60 ms after the first cycle ended.
    assert!(matches!(
        coordinator.poll(Instant::now() + Duration::from_millis(60)),
        CycleOutcome::NotDue { .. }
    ));
}
