//! # Engine Application
//!
//! Connects the frame driver to the [`Host`]: paces the simulation with a
//! [`FrameLimiter`], hands frames to the render thread through a
//! [`FrameSignal`] and records timings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use kiln_core::{FrameLimiter, FrameSignal};

use crate::error::HostResult;
use crate::framework::AppCallbacks;
use crate::graphics::{FeatureLevel, SwapChainDesc};
use crate::host::Host;

/// [`AppCallbacks`] implementation driving a [`Host`].
#[derive(Debug)]
pub struct EngineApp {
    host: Arc<Host>,
    limiter: FrameLimiter,
    frame_ready: FrameSignal,
    interpolate: bool,
    module_created: AtomicBool,
    /// Set when the first-draw wait already consumed a frame.
    first_frame_pending: AtomicBool,
}

impl EngineApp {
    /// Creates the application for `host`, paced at the configured rate.
    ///
    /// # Errors
    ///
    /// [`HostError::Core`](crate::HostError::Core) if the rate is zero.
    pub fn new(host: Arc<Host>) -> HostResult<Self> {
        let settings = host.settings();
        let limiter = FrameLimiter::new(settings.sim_fps)?;
        let interpolate = settings.interpolate_frames;

        Ok(Self {
            host,
            limiter,
            frame_ready: FrameSignal::new(),
            interpolate,
            module_created: AtomicBool::new(false),
            first_frame_pending: AtomicBool::new(false),
        })
    }

    /// The driven host.
    #[must_use]
    #[inline]
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }
}

impl AppCallbacks for EngineApp {
    fn on_sim_tick(&self) {
        let start = Instant::now();
        if !self.module_created.swap(true, Ordering::AcqRel) {
            self.host.st_create_module();
        }

        self.host.st_update(self.limiter.frame_duration());
        self.frame_ready.signal();
        let active = start.elapsed();

        self.limiter.limit_fps();
        self.host.stats().record_sim(active);
    }

    fn on_sim_stopped(&self) {
        self.frame_ready.close();
        self.host.st_dispose_module();
    }

    fn on_before_first_draw(&self) {
        if self.frame_ready.wait() {
            self.first_frame_pending.store(true, Ordering::Release);
            self.host.rt_before_first_draw();
        }
    }

    fn on_draw(&self) {
        let start = Instant::now();
        let alpha = if self.interpolate {
            self.limiter.progress_through_current_frame()
        } else {
            let consumed = self.first_frame_pending.swap(false, Ordering::AcqRel);
            if !consumed && !self.frame_ready.wait() {
                return;
            }
            0.0
        };

        self.host.rt_draw(alpha);
        self.host.stats().record_render(start.elapsed());
    }

    fn on_before_device_reset(&self) {
        self.host.rt_before_device_reset();
    }

    fn on_before_back_buffer_change(&self) {
        self.host.rt_before_back_buffer_change();
    }

    fn on_back_buffer_change(&self) {
        self.host.rt_back_buffer_change();
    }

    fn on_resize(&self, width: u32, height: u32) {
        self.host.render_settings().set_size(width, height);
    }

    fn on_switch_to_fullscreen(&self) -> (u32, u32) {
        let render = self.host.render_settings();
        render.set_fullscreen(true);
        render.size()
    }

    fn on_switch_to_windowed(&self) {
        self.host.render_settings().set_fullscreen(false);
    }

    fn on_external_close(&self) {
        self.host.queue_shut_down();
    }

    fn on_render_stopping(&self) {
        self.frame_ready.close();
    }

    fn on_fatal(&self, sender: &str, message: &str) -> ! {
        self.host.fatal_error(sender, message)
    }

    fn swap_chain_desc(&self) -> SwapChainDesc {
        self.host.render_settings().swap_chain_desc()
    }

    fn feature_levels(&self) -> Vec<FeatureLevel> {
        self.host.compatible_feature_levels()
    }

    fn vsync(&self) -> bool {
        self.host.render_settings().vsync()
    }
}
