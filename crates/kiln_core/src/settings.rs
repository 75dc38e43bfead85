//! # Engine Settings
//!
//! Typed, immutable snapshot of the preferences the engine itself reads.
//! Built once at startup; runtime changes go through the preference map and
//! a fresh snapshot.

use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::preferences::Preferences;

/// Preference keys read by the engine.
pub mod keys {
    /// Simulation ticks per second. Required, non-zero.
    pub const SIM_FPS: &str = "simFps";
    /// Render with interpolation instead of waiting for each sim frame.
    pub const INTERPOLATE_FRAMES: &str = "interpolateFrames";
    /// Window width.
    pub const SCREEN_X: &str = "screenX";
    /// Window height.
    pub const SCREEN_Y: &str = "screenY";
    /// Allow the user to resize the window.
    pub const WINDOW_RESIZE: &str = "windowResize";
    /// Present synchronised to vertical blank.
    pub const VSYNC: &str = "vsync";
    /// Start fullscreen.
    pub const FULLSCREEN: &str = "fullscreen";
    /// Backbuffer multisample level.
    pub const MULTISAMPLE_LEVEL: &str = "multisampleLevel";
}

/// Baseline engine preferences, in the on-disk format.
pub const CORE_DEFAULTS: &str = r#"simFps = "60"
interpolateFrames = "0"
screenX = "1024"
screenY = "768"
windowResize = "1"
vsync = "1"
fullscreen = "0"
multisampleLevel = "1"
"#;

/// Settings snapshot consumed by the frame driver and host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Simulation ticks per second.
    pub sim_fps: u32,
    /// Interpolate render frames between simulation ticks.
    pub interpolate_frames: bool,
    /// Window width in pixels.
    pub screen_x: u32,
    /// Window height in pixels.
    pub screen_y: u32,
    /// User-resizable window.
    pub window_resize: bool,
    /// Vsync-gated present.
    pub vsync: bool,
    /// Start fullscreen.
    pub fullscreen: bool,
    /// Backbuffer multisample level.
    pub multisample_level: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sim_fps: 60,
            interpolate_frames: false,
            screen_x: 1024,
            screen_y: 768,
            window_resize: true,
            vsync: true,
            fullscreen: false,
            multisample_level: 1,
        }
    }
}

impl EngineSettings {
    /// Reads the engine keys out of `prefs`.
    ///
    /// Optional keys fall back to [`EngineSettings::default`].
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingPreference`] if `simFps` is absent
    /// - [`CoreError::InvalidFrameRate`] if `simFps` is zero
    /// - [`CoreError::InvalidPreference`] if any present value fails to parse
    pub fn from_preferences(prefs: &Preferences) -> CoreResult<Self> {
        let defaults = Self::default();

        let sim_fps: u32 = prefs
            .get(keys::SIM_FPS)
            .ok_or_else(|| CoreError::MissingPreference(keys::SIM_FPS.to_owned()))
            .and_then(|raw| parse_value(keys::SIM_FPS, raw))?;
        if sim_fps == 0 {
            return Err(CoreError::InvalidFrameRate(sim_fps));
        }

        Ok(Self {
            sim_fps,
            interpolate_frames: flag(prefs, keys::INTERPOLATE_FRAMES, defaults.interpolate_frames)?,
            screen_x: number(prefs, keys::SCREEN_X, defaults.screen_x)?,
            screen_y: number(prefs, keys::SCREEN_Y, defaults.screen_y)?,
            window_resize: flag(prefs, keys::WINDOW_RESIZE, defaults.window_resize)?,
            vsync: flag(prefs, keys::VSYNC, defaults.vsync)?,
            fullscreen: flag(prefs, keys::FULLSCREEN, defaults.fullscreen)?,
            multisample_level: number(prefs, keys::MULTISAMPLE_LEVEL, defaults.multisample_level)?,
        })
    }

    /// Writes the snapshot back into `prefs`. Keys `prefs` doesn't define
    /// are skipped.
    pub fn write_to(&self, prefs: &mut Preferences) {
        let flag = |b: bool| if b { "1" } else { "0" };
        prefs.set(keys::SIM_FPS, &self.sim_fps.to_string());
        prefs.set(keys::INTERPOLATE_FRAMES, flag(self.interpolate_frames));
        prefs.set(keys::SCREEN_X, &self.screen_x.to_string());
        prefs.set(keys::SCREEN_Y, &self.screen_y.to_string());
        prefs.set(keys::WINDOW_RESIZE, flag(self.window_resize));
        prefs.set(keys::VSYNC, flag(self.vsync));
        prefs.set(keys::FULLSCREEN, flag(self.fullscreen));
        prefs.set(keys::MULTISAMPLE_LEVEL, &self.multisample_level.to_string());
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.trim().parse().map_err(|_| CoreError::InvalidPreference {
        key: key.to_owned(),
        value: raw.to_owned(),
    })
}

fn number(prefs: &Preferences, key: &str, default: u32) -> CoreResult<u32> {
    prefs.get(key).map_or(Ok(default), |raw| parse_value(key, raw))
}

fn flag(prefs: &Preferences, key: &str, default: bool) -> CoreResult<bool> {
    match prefs.get(key).map(str::trim) {
        None => Ok(default),
        Some("1" | "true") => Ok(true),
        Some("0" | "false") => Ok(false),
        Some(other) => Err(CoreError::InvalidPreference {
            key: key.to_owned(),
            value: other.to_owned(),
        }),
    }
}
