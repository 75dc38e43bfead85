//! # Module Contract
//!
//! The game itself is a [`Module`] produced by a [`ModuleFactory`]. The host
//! calls `st_*` hooks from the simulation thread and `rt_*` hooks from the
//! render thread, so a module must be `Sync` and guard any state the two
//! sides share.
//!
//! ```text
//!   sim thread                         render thread
//!   ──────────                         ─────────────
//!   st_new            (first tick)
//!   st_update  ─┐                      rt_before_first_draw
//!   st_update   │ per tick             rt_draw(alpha) ─┐ per frame
//!   ...        ─┘                      ...            ─┘
//!   st_shut_down      (once, queued)   rt_before_device_reset
//!   st_dispose        (sim exit)       rt_before_back_buffer_change
//!                                      rt_back_buffer_change
//! ```
//!
//! Hooks returning `bool` report failure with `false`; the host treats any
//! failure as fatal.

use std::sync::Arc;
use std::time::Duration;

use kiln_vfs::ArchiveHandler;

use crate::graphics::FeatureLevel;
use crate::host::Host;

/// Version of the hook set below. A factory built against another version
/// is rejected before any module is created.
pub const KILN_INTERFACE_VERSION: u32 = 1;

/// A game running inside the host.
pub trait Module: Send + Sync {
    /// Called once on the first simulation tick, before any update.
    fn st_new(&self, _host: &Host) -> bool {
        true
    }

    /// One fixed simulation step of `elapsed` game time.
    fn st_update(&self, host: &Host, elapsed: Duration) -> bool;

    /// Called once on the simulation tick after a shutdown was queued.
    /// The module calls [`Host::shut_down`] once it is ready to exit.
    fn st_shut_down(&self, host: &Host) {
        host.shut_down();
    }

    /// Called on the simulation thread as it exits.
    fn st_dispose(&self, _host: &Host) {}

    /// Called once on the render thread before the first draw, after the
    /// first simulation tick has completed.
    fn rt_before_first_draw(&self, _host: &Host) -> bool {
        true
    }

    /// Device resources are about to be destroyed and recreated.
    fn rt_before_device_reset(&self, _host: &Host) -> bool {
        true
    }

    /// The backbuffer is about to be released.
    fn rt_before_back_buffer_change(&self, _host: &Host) -> bool {
        true
    }

    /// The backbuffer was recreated at a new size or format.
    fn rt_back_buffer_change(&self, _host: &Host) -> bool {
        true
    }

    /// Draws one frame. `alpha` is the progress through the current
    /// simulation frame, or 0 without interpolation.
    fn rt_draw(&self, host: &Host, alpha: f64) -> bool;

    /// Last-chance notification before the process is terminated by a fatal
    /// error.
    fn panic(&self) {}
}

/// Produces the game module and describes what it needs from the host.
pub trait ModuleFactory: Send + Sync {
    /// Hook set version the module was built against.
    fn interface_version(&self) -> u32 {
        KILN_INTERFACE_VERSION
    }

    /// Error recorded while the factory was loaded, if any.
    fn last_error(&self) -> Option<String> {
        None
    }

    /// Creates the module, or `None` on failure.
    fn create_module(&self, host: &Host) -> Option<Arc<dyn Module>>;

    /// Archive formats the game ships, registered after the built-in zip
    /// handler.
    fn custom_archive_handlers(&self) -> Vec<Arc<dyn ArchiveHandler>> {
        Vec::new()
    }

    /// Device feature levels the module can render with, best first.
    fn compatible_feature_levels(&self) -> Vec<FeatureLevel> {
        FeatureLevel::ALL.to_vec()
    }
}
