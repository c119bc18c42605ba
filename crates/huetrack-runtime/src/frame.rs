//! Frame acquisition: a capture thread feeding a latest-frame-wins slot.
//!
//! The capture thread runs at sensor rate and overwrites the slot with
//! every frame; the coordinator [`take`](FrameSlot::take)s whatever is
//! newest when a cycle is admitted. Frames that arrive while a cycle runs
//! are replaced, never queued. The display image goes back out through an
//! [`OutputSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use huetrack_pipeline::RgbImage;
use parking_lot::Mutex;
use tracing::{debug, warn};
use web_time::{Duration, Instant};

/// A frame plus the time it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Pixel data.
    pub image: RgbImage,
    /// Capture time relative to when the source started.
    pub captured_at: Duration,
}

impl CapturedFrame {
    /// Capture timestamp in whole microseconds.
    #[must_use]
    pub fn timestamp_micros(&self) -> u64 {
        u64::try_from(self.captured_at.as_micros()).unwrap_or(u64::MAX)
    }
}

/// Single-frame mailbox shared by the capture thread and the coordinator.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<CapturedFrame>>>,
}

impl FrameSlot {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing any frame not yet taken.
    pub fn put(&self, frame: CapturedFrame) {
        *self.inner.lock() = Some(frame);
    }

    /// Remove and return the newest frame, if one arrived since the last
    /// take.
    #[must_use]
    pub fn take(&self) -> Option<CapturedFrame> {
        self.inner.lock().take()
    }
}

/// Receives the image streamed to operators at the end of each cycle.
pub trait OutputSink {
    /// Accept this cycle's display image.
    fn submit(&mut self, display: RgbImage);
}

/// Latest-wins holder for the streamed display image.
#[derive(Debug, Clone, Default)]
pub struct DisplaySlot {
    inner: Arc<Mutex<Option<RgbImage>>>,
}

impl DisplaySlot {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the newest display image.
    #[must_use]
    pub fn take(&self) -> Option<RgbImage> {
        self.inner.lock().take()
    }
}

impl OutputSink for DisplaySlot {
    fn submit(&mut self, display: RgbImage) {
        *self.inner.lock() = Some(display);
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Errors from a frame source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The source failed to produce a frame.
    #[error("failed to read frame from {source_name}: {message}")]
    Read {
        /// Source description.
        source_name: String,
        /// Underlying failure.
        message: String,
    },

    /// The capture thread could not be started.
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Something that produces frames on demand.
pub trait FrameSource: Send {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if the frame cannot be read. The capture
    /// thread logs the error and keeps going.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// Run `source` on a dedicated thread, publishing every frame into
/// `slot` until the source ends or `stop` fires.
///
/// `pacing` is slept after each frame to emulate a sensor rate; pass
/// [`Duration::ZERO`] for a source that paces itself. The thread returns
/// the number of frames it delivered.
///
/// # Errors
///
/// Returns [`CaptureError::Spawn`] if the OS refuses to create the thread.
pub fn spawn_capture<S: FrameSource + 'static>(
    mut source: S,
    slot: FrameSlot,
    stop: StopSignal,
    pacing: Duration,
) -> Result<JoinHandle<u64>, CaptureError> {
    let handle = thread::Builder::new()
        .name(format!("huetrack-capture-{}", source.name()))
        .spawn(move || {
            let started = Instant::now();
            let mut delivered = 0_u64;
            while !stop.is_stopped() {
                match source.next_frame() {
                    Ok(Some(image)) => {
                        slot.put(CapturedFrame {
                            image,
                            captured_at: started.elapsed(),
                        });
                        delivered += 1;
                    }
                    Ok(None) => {
                        debug!(source = source.name(), delivered, "frame source ended");
                        break;
                    }
                    Err(err) => warn!(source = source.name(), error = %err, "frame capture failed"),
                }
                if !pacing.is_zero() {
                    thread::sleep(pacing);
                }
            }
            delivered
        })?;
    Ok(handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(shade: u8) -> CapturedFrame {
        CapturedFrame {
            image: RgbImage::from_pixel(2, 2, image::Rgb([shade, shade, shade])),
            captured_at: Duration::from_micros(u64::from(shade)),
        }
    }

    #[test]
    fn newest_frame_wins() {
        let slot = FrameSlot::new();
        slot.put(frame(1));
        slot.put(frame(2));
        assert_eq!(slot.take(), Some(frame(2)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn display_slot_keeps_latest() {
        let slot = DisplaySlot::new();
        let mut sink = slot.clone();
        sink.submit(RgbImage::new(1, 1));
        sink.submit(RgbImage::new(2, 2));
        assert_eq!(slot.take().map(|img| img.width()), Some(2));
        assert!(slot.take().is_none());
    }

    #[test]
    fn timestamp_in_micros() {
        let f = CapturedFrame {
            image: RgbImage::new(1, 1),
            captured_at: Duration::from_millis(3),
        };
        assert_eq!(f.timestamp_micros(), 3000);
    }

    #[test]
    fn stop_signal_is_shared() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        assert!(!clone.is_stopped());
        stop.stop();
        assert!(clone.is_stopped());
    }

    struct Counted {
        remaining: u8,
    }

    impl FrameSource for Counted {
        fn name(&self) -> &str {
            "counted"
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbImage::from_pixel(
                1,
                1,
                image::Rgb([self.remaining, 0, 0]),
            )))
        }
    }

    #[test]
    fn capture_thread_delivers_until_end_of_stream() {
        let slot = FrameSlot::new();
        let handle = spawn_capture(
            Counted { remaining: 3 },
            slot.clone(),
            StopSignal::new(),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(handle.join().unwrap(), 3);
        // Only the last frame survives.
        let last = slot.take().unwrap();
        assert_eq!(last.image.get_pixel(0, 0).0[0], 0);
        assert!(slot.take().is_none());
    }

    #[test]
    fn stopped_capture_delivers_nothing() {
        let stop = StopSignal::new();
        stop.stop();
        let slot = FrameSlot::new();
        let handle =
            spawn_capture(Counted { remaining: 3 }, slot.clone(), stop, Duration::ZERO).unwrap();
        assert_eq!(handle.join().unwrap(), 0);
        assert!(slot.take().is_none());
    }
}
