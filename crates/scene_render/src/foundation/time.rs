//! Frame timing and pacing
//!
//! [`Timer`] counts frames for the render loop. [`FramePacer`] measures each
//! frame and, when a target frame rate is configured, sleeps out whatever is
//! left of the frame budget.

use std::time::{Duration, Instant};

/// Free-running frame timer, ticked once per frame by the frame driver
#[derive(Debug)]
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Timer starting at frame zero
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance by one frame
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Seconds between the last two ticks
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds since creation, summed over ticks
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Frames ticked so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Measures frames and holds them to an optional frame rate
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    budget: Option<Duration>,
    frame_start: Instant,
}

impl FramePacer {
    /// Pacer for `target_fps`; `None` or zero leaves frames unthrottled
    pub fn new(target_fps: Option<u32>) -> Self {
        Self {
            budget: target_fps
                .filter(|&fps| fps > 0)
                .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps))),
            frame_start: Instant::now(),
        }
    }

    /// Time allowed per frame
    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Mark the start of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time since [`FramePacer::begin_frame`]
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Budget left after `elapsed` of work
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.budget
            .map_or(Duration::ZERO, |budget| budget.saturating_sub(elapsed))
    }

    /// Sleep out the rest of the budget, returning the time slept
    pub fn finish_frame(&self) -> Duration {
        let idle = self.remaining(self.elapsed());
        if !idle.is_zero() {
            std::thread::sleep(idle);
        }
        idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_counts_ticks() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.total_time() >= timer.delta_time());
    }

    #[test]
    fn test_unlimited_pacer_never_waits() {
        let pacer = FramePacer::new(None);
        assert_eq!(pacer.budget(), None);
        assert_eq!(pacer.remaining(Duration::ZERO), Duration::ZERO);
        assert_eq!(FramePacer::new(Some(0)).budget(), None);
    }

    #[test]
    fn test_pacer_budget_from_target_fps() {
        let pacer = FramePacer::new(Some(50));
        assert_eq!(pacer.budget(), Some(Duration::from_millis(20)));
        assert_eq!(pacer.remaining(Duration::from_millis(5)), Duration::from_millis(15));
        assert_eq!(pacer.remaining(Duration::from_millis(30)), Duration::ZERO);
    }

    #[test]
    fn test_finish_frame_fills_the_budget() {
        let mut pacer = FramePacer::new(Some(200));
        pacer.begin_frame();
        pacer.finish_frame();
        assert!(pacer.elapsed() >= Duration::from_millis(5));
    }
}
