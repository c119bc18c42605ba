//! huetrack: run the vision coordinator against a directory of frames.
//!
//! Replays the images in a directory as a camera feed, drives one camera's
//! coordinator over them and prints every key/value write and UI message
//! to stdout. Useful for:
//!
//! - Tuning a pipeline's HSV bounds and filters against recorded frames
//! - Checking which stage a scene stops at
//! - Inspecting the overlay images the operator stream would show
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin huetrack -- --frames <DIR> [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use huetrack_pipeline::RgbImage;
use huetrack_runtime::{
    Camera, CaptureError, ControlHandle, FrameScheduler, FrameSlot, FrameSource, NullDevice,
    OutputSink, PipelineCoordinator, RunLimits, SettingsStore, Sinks, StopSignal, TableValue,
    TelemetryTable, UiChannel, UiMessage, VideoMode, control_queue, spawn_capture,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use web_time::Duration;

/// Image extensions picked up from the frames directory.
const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Shortest wait for a new frame before the run is considered finished.
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// Run the huetrack coordinator over recorded frames.
///
/// Frames are read in file-name order and paced at the camera's frame
/// rate. The run ends when the frames are exhausted, after `--cycles`
/// published cycles, or on Ctrl+C.
#[derive(Parser)]
#[command(name = "huetrack", version)]
struct Cli {
    /// Directory of frames (PNG, JPEG, BMP, WebP).
    #[arg(long)]
    frames: PathBuf,

    /// Settings file. Without one, a single camera with a default
    /// pipeline is used.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Camera to run from the settings file (default: the first).
    #[arg(long)]
    camera: Option<String>,

    /// Camera the operator UI is watching (default: the running camera).
    #[arg(long)]
    active_camera: Option<String>,

    /// Pipeline to select before the first frame, as `pipeline<index>`.
    #[arg(long)]
    pipeline: Option<String>,

    /// Start in driver mode.
    #[arg(long)]
    driver: bool,

    /// Target frame rate (default: the camera's video mode rate).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    fps: Option<u32>,

    /// Stop after this many published cycles.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..))]
    cycles: Option<u64>,

    /// Write each cycle's display image as PNG into this directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print table writes and UI messages as JSON lines.
    #[arg(long)]
    json: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let camera = match load_camera(&cli) {
        Ok(camera) => camera,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = match DirectorySource::open(&cli.frames) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.frames.display());
            return ExitCode::FAILURE;
        }
    };
    if source.is_empty() {
        eprintln!("No frames found in {}", cli.frames.display());
        return ExitCode::FAILURE;
    }

    if let Some(ref dir) = cli.output
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("Error creating {}: {e}", dir.display());
        return ExitCode::FAILURE;
    }

    let target_fps = cli.fps.unwrap_or(camera.video_mode().fps).max(1);
    let period = Duration::from_secs_f64(1.0 / f64::from(target_fps));
    let camera_name = camera.name().to_string();
    let device = NullDevice::new(VideoMode {
        fps: target_fps,
        ..camera.video_mode()
    });

    let (control, queue) = control_queue();
    if let Err(msg) = queue_startup_commands(&cli, &control) {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    let frames = FrameSlot::new();
    let sinks = Sinks {
        table: PrintTable {
            camera: camera_name.clone(),
            json: cli.json,
        },
        ui: PrintUi {
            camera: camera_name.clone(),
            json: cli.json,
        },
        output: PngWriter {
            dir: cli.output.clone(),
            written: 0,
        },
    };
    let mut coordinator = PipelineCoordinator::new(camera, device, sinks, frames.clone(), queue);
    coordinator.set_scheduler(FrameScheduler::new(target_fps));
    coordinator.start();

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.stop()) {
        warn!(error = %e, "Ctrl+C handler not installed");
    }

    let capture = match spawn_capture(source, frames, stop.clone(), period) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let limits = RunLimits {
        max_cycles: cli.cycles,
        idle_timeout: Some((period * 4).max(MIN_IDLE_TIMEOUT)),
    };
    let published = coordinator.run(&stop, limits);
    stop.stop();

    let delivered = capture.join().unwrap_or_else(|_| {
        warn!("capture thread panicked");
        0
    });
    info!(
        camera = %camera_name,
        delivered,
        published,
        written = coordinator.sinks().output.written,
        "run finished"
    );
    eprintln!("{delivered} frames captured, {published} cycles published");

    ExitCode::SUCCESS
}

/// Resolve the camera to run from the CLI arguments.
fn load_camera(cli: &Cli) -> Result<Camera, String> {
    let Some(ref path) = cli.settings else {
        let name = cli.camera.clone().unwrap_or_else(|| "camera".to_string());
        return Ok(Camera::with_default_pipeline(name, VideoMode::default()));
    };

    let store = SettingsStore::load(path).map_err(|e| e.to_string())?;
    let config = match cli.camera {
        Some(ref name) => store
            .cameras
            .into_iter()
            .find(|camera| &camera.name == name)
            .ok_or_else(|| format!("No camera named {name:?} in {}", path.display()))?,
        None => store
            .cameras
            .into_iter()
            .next()
            .ok_or_else(|| format!("No cameras in {}", path.display()))?,
    };
    config.into_camera().map_err(|e| e.to_string())
}

/// Queue the control commands implied by the startup flags.
fn queue_startup_commands(cli: &Cli, control: &ControlHandle) -> Result<(), String> {
    if let Some(ref entry) = cli.pipeline {
        control
            .select_pipeline(entry.as_str())
            .map_err(|e| format!("Error queueing pipeline selection: {e}"))?;
    }
    if cli.driver {
        control
            .set_driver_mode(true)
            .map_err(|e| format!("Error queueing driver mode: {e}"))?;
    }
    if let Some(ref active) = cli.active_camera {
        control
            .set_active_camera(active.as_str())
            .map_err(|e| format!("Error queueing active camera: {e}"))?;
    }
    Ok(())
}

/// Image files in a directory, replayed in file-name order.
struct DirectorySource {
    name: String,
    paths: VecDeque<PathBuf>,
}

impl DirectorySource {
    fn open(dir: &Path) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        FRAME_EXTENSIONS
                            .iter()
                            .any(|known| known.eq_ignore_ascii_case(ext))
                    })
            })
            .collect();
        paths.sort();
        let name = dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("frames")
            .to_string();
        Ok(Self {
            name,
            paths: paths.into(),
        })
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        image::open(&path)
            .map(|decoded| Some(decoded.to_rgb8()))
            .map_err(|e| CaptureError::Read {
                source_name: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// Prints every table write to stdout.
struct PrintTable {
    camera: String,
    json: bool,
}

impl TelemetryTable for PrintTable {
    fn put(&mut self, key: &str, value: TableValue) {
        if self.json {
            let line = serde_json::json!({
                "camera": self.camera,
                "key": key,
                "value": value,
            });
            println!("{line}");
        } else {
            let shown = match value {
                TableValue::Bool(b) => b.to_string(),
                TableValue::Number(n) => format!("{n:.3}"),
                TableValue::String(s) => s,
            };
            println!("{}/{key} = {shown}", self.camera);
        }
    }
}

/// Prints every UI broadcast to stdout.
struct PrintUi {
    camera: String,
    json: bool,
}

impl UiChannel for PrintUi {
    fn broadcast(&mut self, message: &UiMessage) {
        if self.json {
            let line = serde_json::json!({ "camera": self.camera, "ui": message });
            println!("{line}");
            return;
        }
        match serde_json::to_string(message) {
            Ok(body) => println!("{} ui <- {body}", self.camera),
            Err(e) => warn!(error = %e, "UI message not serializable"),
        }
    }

    fn send_full_settings(&mut self) {
        if self.json {
            let line = serde_json::json!({ "camera": self.camera, "ui": "full_settings" });
            println!("{line}");
        } else {
            println!("{} ui <- full settings", self.camera);
        }
    }
}

/// Writes display images as numbered PNGs, or discards them.
struct PngWriter {
    dir: Option<PathBuf>,
    written: u64,
}

impl OutputSink for PngWriter {
    fn submit(&mut self, display: RgbImage) {
        let Some(ref dir) = self.dir else {
            return;
        };
        let path = dir.join(format!("frame-{:05}.png", self.written));
        match display.save(&path) {
            Ok(()) => self.written += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "display image not written"),
        }
    }
}
