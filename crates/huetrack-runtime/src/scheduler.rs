//! Frame-rate gate and FPS estimate.
//!
//! The coordinator polls [`FrameScheduler::should_admit`] and only starts
//! a cycle once enough time has passed since the previous cycle ended.
//! Timestamps are passed in by the caller so the gate is deterministic
//! under test.

use web_time::{Duration, Instant};

/// Extra spacing added to the nominal frame period.
const ADMIT_SLACK: Duration = Duration::from_millis(3);

/// Minimum interval between UI FPS refreshes.
const UI_FPS_INTERVAL: Duration = Duration::from_millis(500);

/// Gates cycle starts to a target rate and tracks the achieved rate.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    target_fps: u32,
    last_cycle_end: Option<Instant>,
    last_ui_update: Option<Instant>,
    fps: f64,
    ui_fps: f64,
}

impl FrameScheduler {
    /// Default target rate.
    pub const DEFAULT_TARGET_FPS: u32 = 30;

    /// Create a scheduler for `target_fps`, clamped to at least 1.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_fps: target_fps.max(1),
            last_cycle_end: None,
            last_ui_update: None,
            fps: 0.0,
            ui_fps: 0.0,
        }
    }

    /// The clamped target rate.
    #[must_use]
    pub const fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Minimum time from one cycle's end to the next cycle's start: the
    /// nominal frame period plus 3 ms.
    #[must_use]
    pub fn min_spacing(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps)) + ADMIT_SLACK
    }

    /// Whether a cycle may start at `now`. Always true before the first
    /// cycle has finished.
    #[must_use]
    pub fn should_admit(&self, now: Instant) -> bool {
        self.time_until_admit(now).is_zero()
    }

    /// How long until [`should_admit`](Self::should_admit) turns true.
    #[must_use]
    pub fn time_until_admit(&self, now: Instant) -> Duration {
        self.last_cycle_end.map_or(Duration::ZERO, |end| {
            self.min_spacing()
                .saturating_sub(now.saturating_duration_since(end))
        })
    }

    /// Mark the start of an admitted cycle, refreshing the UI FPS if the
    /// last refresh is at least 500 ms old.
    pub fn begin_cycle(&mut self, now: Instant) {
        let due = self
            .last_ui_update
            .is_none_or(|last| now.saturating_duration_since(last) >= UI_FPS_INTERVAL);
        if due {
            self.ui_fps = self.fps.min(f64::from(self.target_fps));
            self.last_ui_update = Some(now);
        }
    }

    /// Record a finished cycle and recompute the instantaneous FPS from
    /// its duration. A zero-length cycle leaves the estimate unchanged.
    pub fn finish_cycle(&mut self, start: Instant, end: Instant) {
        self.last_cycle_end = Some(end);
        let millis = end.saturating_duration_since(start).as_secs_f64() * 1000.0;
        if millis > 0.0 {
            self.fps = 1000.0 / millis;
        }
    }

    /// Instantaneous FPS from the last cycle's duration (unclamped).
    #[must_use]
    pub const fn fps(&self) -> f64 {
        self.fps
    }

    /// FPS shown to operators: refreshed at most twice a second and never
    /// above the target.
    #[must_use]
    pub const fn ui_fps(&self) -> f64 {
        self.ui_fps
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TARGET_FPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_check_always_admits() {
        let scheduler = FrameScheduler::new(30);
        assert!(scheduler.should_admit(Instant::now()));
    }

    #[test]
    fn thirty_fps_rejects_checks_20ms_apart() {
        let mut scheduler = FrameScheduler::new(30);
        let t0 = Instant::now();
        assert!(scheduler.should_admit(t0));
        scheduler.begin_cycle(t0);
        scheduler.finish_cycle(t0, t0);
        assert!(!scheduler.should_admit(t0 + ms(20)));
    }

    #[test]
    fn admits_after_period_plus_slack() {
        let mut scheduler = FrameScheduler::new(30);
        let t0 = Instant::now();
        scheduler.finish_cycle(t0, t0);
        // 33.3 ms period plus 3 ms.
        let spacing = scheduler.min_spacing();
        assert!(spacing > ms(36) && spacing < ms(37), "{spacing:?}");
        assert!(!scheduler.should_admit(t0 + ms(36)));
        assert!(scheduler.should_admit(t0 + ms(37)));
        let wait = scheduler.time_until_admit(t0 + ms(30));
        assert!(wait > ms(6) && wait < ms(7), "{wait:?}");
        assert_eq!(scheduler.time_until_admit(t0 + ms(50)), Duration::ZERO);
    }

    #[test]
    fn spacing_is_measured_from_cycle_end() {
        let mut scheduler = FrameScheduler::new(100);
        let t0 = Instant::now();
        scheduler.finish_cycle(t0, t0 + ms(40));
        assert!(!scheduler.should_admit(t0 + ms(45)));
        assert!(scheduler.should_admit(t0 + ms(54)));
    }

    #[test]
    fn zero_target_is_clamped() {
        let scheduler = FrameScheduler::new(0);
        assert_eq!(scheduler.target_fps(), 1);
        assert_eq!(scheduler.min_spacing(), ms(1003));
    }

    #[test]
    fn fps_follows_cycle_duration() {
        let mut scheduler = FrameScheduler::new(30);
        let t0 = Instant::now();
        scheduler.finish_cycle(t0, t0 + ms(10));
        assert!((scheduler.fps() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn ui_fps_is_clamped_and_throttled() {
        let mut scheduler = FrameScheduler::new(30);
        let t0 = Instant::now();
        scheduler.begin_cycle(t0);
        assert!(scheduler.ui_fps().abs() < f64::EPSILON);

        // 10 ms cycles → 100 FPS, shown as the 30 FPS target.
        scheduler.finish_cycle(t0, t0 + ms(10));
        scheduler.begin_cycle(t0 + ms(100));
        assert!(scheduler.ui_fps().abs() < f64::EPSILON, "refreshed too early");
        scheduler.begin_cycle(t0 + ms(500));
        assert!((scheduler.ui_fps() - 30.0).abs() < 1e-9);

        // 50 ms cycles → 20 FPS, below the target.
        scheduler.finish_cycle(t0 + ms(500), t0 + ms(550));
        scheduler.begin_cycle(t0 + ms(1000));
        assert!((scheduler.ui_fps() - 20.0).abs() < 1e-6);
    }
}
