//! # Render Settings
//!
//! Runtime-adjustable display settings. Changes that need a new swapchain
//! do not apply immediately; they queue a backbuffer change that the render
//! thread services on its next frame.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use kiln_core::EngineSettings;

use crate::graphics::SwapChainDesc;
use crate::window::{ScreenMode, WindowIntents};

/// Display settings shared by the module, host and render thread.
#[derive(Debug)]
pub struct RenderSettings {
    base: EngineSettings,
    vsync: AtomicBool,
    fullscreen: AtomicBool,
    multisample_level: AtomicU32,
    width: AtomicU32,
    height: AtomicU32,
    intents: Arc<WindowIntents>,
}

impl RenderSettings {
    /// Seeds the settings from the startup snapshot.
    #[must_use]
    pub fn new(settings: &EngineSettings, intents: Arc<WindowIntents>) -> Self {
        Self {
            base: settings.clone(),
            vsync: AtomicBool::new(settings.vsync),
            fullscreen: AtomicBool::new(settings.fullscreen),
            multisample_level: AtomicU32::new(settings.multisample_level.max(1)),
            width: AtomicU32::new(settings.screen_x),
            height: AtomicU32::new(settings.screen_y),
            intents,
        }
    }

    /// Vsync-gated present.
    #[must_use]
    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync.load(Ordering::Acquire)
    }

    /// Takes effect on the next present.
    pub fn set_vsync(&self, vsync: bool) {
        self.vsync.store(vsync, Ordering::Release);
    }

    /// Whether the swapchain is fullscreen.
    #[must_use]
    #[inline]
    pub fn fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Acquire)
    }

    /// Records the fullscreen state after a mode switch.
    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::Release);
    }

    /// Asks the render thread to switch screen mode.
    pub fn request_fullscreen(&self, fullscreen: bool) {
        if fullscreen != self.intents.is_fullscreen() {
            self.intents.toggle_fullscreen();
        } else if fullscreen != self.fullscreen() {
            self.intents.request_screen_mode(if fullscreen {
                ScreenMode::Fullscreen
            } else {
                ScreenMode::Windowed
            });
        }
    }

    /// Backbuffer multisample level.
    #[must_use]
    #[inline]
    pub fn multisample_level(&self) -> u32 {
        self.multisample_level.load(Ordering::Acquire)
    }

    /// Sets the multisample level, queueing a backbuffer change if it
    /// differs. Levels below 1 are clamped to 1.
    pub fn set_multisample_level(&self, level: u32) {
        let level = level.max(1);
        if self.multisample_level.swap(level, Ordering::AcqRel) != level {
            self.intents.queue_back_buffer_change();
        }
    }

    /// Current backbuffer size.
    #[must_use]
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }

    /// Records the backbuffer size after a resize.
    pub fn set_size(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::Release);
        self.height.store(height, Ordering::Release);
    }

    /// Forces swapchain recreation with the current settings.
    pub fn apply_settings(&self) {
        self.intents.queue_back_buffer_change();
    }

    /// Swapchain parameters for the current settings.
    #[must_use]
    pub fn swap_chain_desc(&self) -> SwapChainDesc {
        let (width, height) = self.size();
        SwapChainDesc {
            width,
            height,
            multisample_level: self.multisample_level(),
        }
    }

    /// Startup settings with the live display values applied, for saving
    /// back to preferences.
    #[must_use]
    pub fn snapshot(&self) -> EngineSettings {
        let (screen_x, screen_y) = self.size();
        EngineSettings {
            vsync: self.vsync(),
            fullscreen: self.fullscreen(),
            multisample_level: self.multisample_level(),
            screen_x,
            screen_y,
            ..self.base.clone()
        }
    }
}
