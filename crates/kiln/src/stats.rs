//! # Host Statistics
//!
//! Rolling averages of simulation and render frame times plus frame
//! counters. Writers are the sim and render threads; readers take a
//! [`HostInfo`] snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::module::KILN_INTERFACE_VERSION;

/// Samples kept per rolling average.
pub const TIMING_WINDOW: usize = 60;

/// Fixed-capacity window of frame times.
#[derive(Debug, Clone)]
pub struct TimingWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
    total: Duration,
}

impl TimingWindow {
    /// Creates an empty window holding up to `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total: Duration::ZERO,
        }
    }

    /// Adds a sample, evicting the oldest once full.
    pub fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.total = self.total.saturating_sub(oldest);
            }
        }
        self.samples.push_back(sample);
        self.total += sample;
    }

    /// Mean of the retained samples, zero when empty.
    #[must_use]
    pub fn average(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total / n,
        }
    }

    /// Number of retained samples.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no sample was recorded.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Live counters updated by the frame threads.
#[derive(Debug)]
pub struct HostStats {
    sim: Mutex<TimingWindow>,
    render: Mutex<TimingWindow>,
    sim_frames: AtomicU64,
    render_frames: AtomicU64,
}

impl Default for HostStats {
    fn default() -> Self {
        Self {
            sim: Mutex::new(TimingWindow::new(TIMING_WINDOW)),
            render: Mutex::new(TimingWindow::new(TIMING_WINDOW)),
            sim_frames: AtomicU64::new(0),
            render_frames: AtomicU64::new(0),
        }
    }
}

impl HostStats {
    /// Records one simulation tick's active time.
    pub fn record_sim(&self, active: Duration) {
        self.sim.lock().record(active);
        self.sim_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one render frame's active time.
    pub fn record_render(&self, active: Duration) {
        self.render.lock().record(active);
        self.render_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed simulation ticks.
    #[must_use]
    pub fn sim_frames(&self) -> u64 {
        self.sim_frames.load(Ordering::Relaxed)
    }

    /// Completed render frames.
    #[must_use]
    pub fn render_frames(&self) -> u64 {
        self.render_frames.load(Ordering::Relaxed)
    }

    /// Snapshot for display or logging.
    #[must_use]
    pub fn snapshot(&self, sim_fps: u32) -> HostInfo {
        HostInfo {
            engine_version: env!("CARGO_PKG_VERSION"),
            interface_version: KILN_INTERFACE_VERSION,
            sim_fps,
            sim_frames: self.sim_frames(),
            render_frames: self.render_frames(),
            avg_sim_time: self.sim.lock().average(),
            avg_render_time: self.render.lock().average(),
        }
    }
}

/// Point-in-time host information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Engine crate version.
    pub engine_version: &'static str,
    /// Module interface version.
    pub interface_version: u32,
    /// Target simulation rate.
    pub sim_fps: u32,
    /// Completed simulation ticks.
    pub sim_frames: u64,
    /// Completed render frames.
    pub render_frames: u64,
    /// Average active time per tick.
    pub avg_sim_time: Duration,
    /// Average active time per render frame.
    pub avg_render_time: Duration,
}

impl std::fmt::Display for HostInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kiln {} (interface {}): {} sim / {} render frames, sim {:?}, render {:?} @ {} fps",
            self.engine_version,
            self.interface_version,
            self.sim_frames,
            self.render_frames,
            self.avg_sim_time,
            self.avg_render_time,
            self.sim_fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = TimingWindow::new(2);
        window.record(Duration::from_millis(10));
        window.record(Duration::from_millis(20));
        window.record(Duration::from_millis(40));

        assert_eq!(window.len(), 2);
        assert_eq!(window.average(), Duration::from_millis(30));
    }

    #[test]
    fn test_empty_average_is_zero() {
        let window = TimingWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.average(), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_counts_frames() {
        let stats = HostStats::default();
        stats.record_sim(Duration::from_millis(2));
        stats.record_sim(Duration::from_millis(4));
        stats.record_render(Duration::from_millis(8));

        let info = stats.snapshot(60);
        assert_eq!(info.sim_frames, 2);
        assert_eq!(info.render_frames, 1);
        assert_eq!(info.avg_sim_time, Duration::from_millis(3));
        assert_eq!(info.interface_version, KILN_INTERFACE_VERSION);
    }
}
