//! # Frame Limiter
//!
//! Paces a loop to a fixed number of iterations per second.
//!
//! ```text
//!   previous_frame_end                      previous_frame_end + frame_duration
//!          │                                               │
//!          ├──── sleep(1ms) ──── sleep(1ms) ──── ... ──┬── yield ── yield ──┤
//!          │                                           │                    │
//!          │                            final SPIN_WINDOW (2ms)             │
//! ```
//!
//! Coarse sleeps cover the bulk of the wait so the thread gives up its core;
//! the last couple of milliseconds are spent yielding, since a 1ms sleep can
//! overshoot by a whole scheduler quantum.
//!
//! The timestamp is shared with render threads reading
//! [`FrameLimiter::progress_through_current_frame`], so it lives behind a
//! mutex and is only held for the read or the write, never across a sleep.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};

/// Below this much remaining time the limiter yields instead of sleeping.
pub const SPIN_WINDOW: Duration = Duration::from_millis(2);

/// Length of one coarse sleep.
pub const COARSE_SLEEP: Duration = Duration::from_millis(1);

/// Largest value returned by [`FrameLimiter::progress_through_current_frame`].
const MAX_PROGRESS: f64 = 1.0 - f64::EPSILON;

/// Fixed-rate pacing for the simulation thread.
#[derive(Debug)]
pub struct FrameLimiter {
    /// Target iterations per second.
    max_fps: u32,
    /// `1 / max_fps`.
    frame_duration: Duration,
    /// When the last call to `limit_fps` returned.
    previous_frame_end: Mutex<Instant>,
}

impl FrameLimiter {
    /// Creates a limiter targeting `max_fps` frames per second.
    ///
    /// The first frame period starts now.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFrameRate`] if `max_fps` is zero.
    pub fn new(max_fps: u32) -> CoreResult<Self> {
        if max_fps == 0 {
            return Err(CoreError::InvalidFrameRate(max_fps));
        }

        Ok(Self {
            max_fps,
            frame_duration: Duration::from_secs(1) / max_fps,
            previous_frame_end: Mutex::new(Instant::now()),
        })
    }

    /// Target frames per second.
    #[inline]
    #[must_use]
    pub fn max_fps(&self) -> u32 {
        self.max_fps
    }

    /// Duration of one target frame.
    #[inline]
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Blocks until a full frame period has elapsed since the previous call
    /// returned (or since construction for the first call).
    ///
    /// Returns immediately if the caller already overran the frame.
    pub fn limit_fps(&self) {
        let target = *self.previous_frame_end.lock() + self.frame_duration;

        loop {
            let now = Instant::now();
            if now >= target {
                break;
            }
            if target - now > SPIN_WINDOW {
                thread::sleep(COARSE_SLEEP);
            } else {
                thread::yield_now();
            }
        }

        *self.previous_frame_end.lock() = Instant::now();
    }

    /// How far the current frame period has progressed, in `[0, 1)`.
    ///
    /// Used as the interpolation alpha by the render thread. Saturates just
    /// below 1 when the simulation is running late.
    #[must_use]
    pub fn progress_through_current_frame(&self) -> f64 {
        let previous = *self.previous_frame_end.lock();
        let elapsed = previous.elapsed().as_secs_f64();
        (elapsed / self.frame_duration.as_secs_f64()).clamp(0.0, MAX_PROGRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_fps_rejected() {
        let result = FrameLimiter::new(0);
        assert!(matches!(result, Err(CoreError::InvalidFrameRate(0))));
    }

    #[test]
    fn test_frame_duration() {
        let limiter = FrameLimiter::new(50).unwrap();
        assert_eq!(limiter.max_fps(), 50);
        assert_eq!(limiter.frame_duration(), Duration::from_millis(20));
    }

    #[test]
    fn test_limit_fps_waits_at_least_one_frame() {
        let limiter = FrameLimiter::new(100).unwrap();
        limiter.limit_fps();

        let start = Instant::now();
        limiter.limit_fps();
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn test_limit_fps_returns_immediately_when_late() {
        let limiter = FrameLimiter::new(100).unwrap();
        thread::sleep(Duration::from_millis(15));

        let start = Instant::now();
        limiter.limit_fps();
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_progress_in_range() {
        let limiter = FrameLimiter::new(1000).unwrap();
        let early = limiter.progress_through_current_frame();
        assert!((0.0..1.0).contains(&early));

        thread::sleep(Duration::from_millis(5));
        let late = limiter.progress_through_current_frame();
        assert!(late < 1.0);
        assert!(late > 0.99);
    }

    #[test]
    fn test_progress_resets_after_limit() {
        let limiter = FrameLimiter::new(10).unwrap();
        limiter.limit_fps();
        assert!(limiter.progress_through_current_frame() < 0.5);
    }
}
