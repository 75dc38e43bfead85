//! # Host
//!
//! Everything a module sees of the engine: content ([`Vfs`]), saves,
//! preferences, parameters, render settings and statistics, plus the
//! module lifecycle and the fatal error channel.
//!
//! ## Shutdown
//!
//! ```text
//!   close button ─► queue_shut_down ─► (next tick) module.st_shut_down
//!                                                     │
//!                                      module calls host.shut_down
//!                                                     │
//!                                      shutdown handler (close_window)
//! ```
//!
//! ## Fatal errors
//!
//! [`Host::fatal_error`] logs, flushes, gives the module a last look via
//! [`Module::panic`], runs the fatal handler and terminates. It never
//! returns.

use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use kiln_core::{EngineSettings, Parameters, PreferenceSources, Preferences};
use kiln_vfs::Vfs;
use parking_lot::Mutex;

use crate::error::HostResult;
use crate::graphics::FeatureLevel;
use crate::module::{Module, ModuleFactory, KILN_INTERFACE_VERSION};
use crate::render_settings::RenderSettings;
use crate::save::SaveStore;
use crate::stats::{HostInfo, HostStats};
use crate::window::WindowIntents;

/// Ends the process with an exit code.
pub type Terminator = fn(i32) -> !;

type ShutdownHandler = Box<dyn Fn() + Send + Sync>;
type FatalHandler = Box<dyn Fn(&str, &str) + Send + Sync>;

thread_local! {
    static REPORTING_FATAL: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside [`Host::fatal_error`].
struct FatalScope;

impl FatalScope {
    /// `None` if this thread is already reporting a fatal error.
    fn enter() -> Option<Self> {
        REPORTING_FATAL.with(|flag| (!flag.replace(true)).then_some(Self))
    }
}

impl Drop for FatalScope {
    fn drop(&mut self) {
        REPORTING_FATAL.with(|flag| flag.set(false));
    }
}

/// Inputs needed to build a [`Host`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Game content directory, mounted as the VFS root.
    pub content_dir: PathBuf,
    /// Save base directory.
    pub save_dir: PathBuf,
    /// Preference files.
    pub preferences: PreferenceSources,
    /// Parsed command line.
    pub params: Parameters,
    /// Game identifier written into saves.
    pub game_uid: String,
    /// Game version written into saves.
    pub game_version: String,
}

/// The engine as seen by a module.
pub struct Host {
    factory: Box<dyn ModuleFactory>,
    module: OnceLock<Arc<dyn Module>>,
    vfs: Vfs,
    saves: SaveStore,
    params: Parameters,
    preferences: Mutex<Preferences>,
    user_preferences: PathBuf,
    settings: EngineSettings,
    render_settings: RenderSettings,
    intents: Arc<WindowIntents>,
    stats: HostStats,
    shutdown_queued: AtomicBool,
    shutdown_notified: AtomicBool,
    shutdown_handler: Mutex<Option<ShutdownHandler>>,
    fatal_handler: Mutex<Option<FatalHandler>>,
    fatal_lock: Mutex<()>,
    terminator: Terminator,
}

impl Host {
    /// Loads preferences, mounts content and opens the save store.
    ///
    /// # Errors
    ///
    /// - [`HostError::Core`] if preferences are missing or invalid
    /// - [`HostError::Vfs`] if the content directory cannot be mounted
    /// - [`HostError::Save`] if the save directory cannot be created
    ///
    /// [`HostError::Core`]: crate::HostError::Core
    /// [`HostError::Vfs`]: crate::HostError::Vfs
    /// [`HostError::Save`]: crate::HostError::Save
    pub fn new(config: HostConfig, factory: Box<dyn ModuleFactory>) -> HostResult<Self> {
        let preferences = Preferences::load_layered(&config.preferences)?;
        let settings = EngineSettings::from_preferences(&preferences)?;

        let mut vfs = Vfs::with_default_handlers();
        for handler in factory.custom_archive_handlers() {
            vfs.register_archive_handler(handler);
        }
        vfs.mount(&config.content_dir)?;

        let saves = SaveStore::new(&config.save_dir, config.game_uid, config.game_version)?;

        let intents = Arc::new(WindowIntents::new(
            settings.screen_x,
            settings.screen_y,
            settings.fullscreen,
        ));
        let render_settings = RenderSettings::new(&settings, Arc::clone(&intents));

        tracing::info!(
            "Host ready: {} content, {} fps, {} archive handlers",
            config.content_dir.display(),
            settings.sim_fps,
            vfs.handler_count()
        );

        Ok(Self {
            factory,
            module: OnceLock::new(),
            vfs,
            saves,
            params: config.params,
            preferences: Mutex::new(preferences),
            user_preferences: config.preferences.user,
            settings,
            render_settings,
            intents,
            stats: HostStats::default(),
            shutdown_queued: AtomicBool::new(false),
            shutdown_notified: AtomicBool::new(false),
            shutdown_handler: Mutex::new(None),
            fatal_handler: Mutex::new(None),
            fatal_lock: Mutex::new(()),
            terminator: std::process::exit,
        })
    }

    /// Replaces the process exit used by [`Host::fatal_error`].
    #[must_use]
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Installs the callback run by [`Host::shut_down`].
    pub fn set_shutdown_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.shutdown_handler.lock() = Some(Box::new(handler));
    }

    /// Installs the callback run by [`Host::fatal_error`] before exit.
    pub fn set_fatal_handler(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        *self.fatal_handler.lock() = Some(Box::new(handler));
    }

    // =========================================================================
    // MODULE LIFECYCLE (sim thread)
    // =========================================================================

    /// Creates the module and runs its `st_new` hook. Called on the first
    /// simulation tick.
    ///
    /// Factory load errors, interface version mismatches, creation failures
    /// and a failing `st_new` are fatal.
    pub fn st_create_module(&self) {
        if let Some(error) = self.factory.last_error() {
            self.fatal_error("Host", &format!("module failed to load: {error}"));
        }

        let version = self.factory.interface_version();
        if version != KILN_INTERFACE_VERSION {
            self.fatal_error(
                "Host",
                &format!(
                    "module interface version {version} is not supported (expected {KILN_INTERFACE_VERSION})"
                ),
            );
        }

        let Some(module) = self.factory.create_module(self) else {
            self.fatal_error("Host", "module creation failed");
        };
        if self.module.set(Arc::clone(&module)).is_err() {
            tracing::warn!("Module already created, ignoring");
            return;
        }
        tracing::info!("Module created (interface {version})");

        if !module.st_new(self) {
            self.fatal_error("Module", "st_new failed");
        }
    }

    /// Runs one simulation step, first delivering a queued shutdown.
    pub fn st_update(&self, elapsed: Duration) {
        let Some(module) = self.module.get() else {
            return;
        };

        if self.shutdown_queued.load(Ordering::Acquire)
            && self
                .shutdown_notified
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::info!("Delivering shutdown to module");
            module.st_shut_down(self);
        }

        if !module.st_update(self, elapsed) {
            self.fatal_error("Module", "st_update failed");
        }
    }

    /// Runs the module's `st_dispose` hook. Called as the sim thread exits.
    pub fn st_dispose_module(&self) {
        if let Some(module) = self.module.get() {
            module.st_dispose(self);
            tracing::debug!("Module disposed");
        }
    }

    // =========================================================================
    // MODULE LIFECYCLE (render thread)
    // =========================================================================

    /// Runs `rt_before_first_draw`.
    pub fn rt_before_first_draw(&self) {
        self.render_hook("rt_before_first_draw", |m| m.rt_before_first_draw(self));
    }

    /// Runs `rt_before_device_reset`.
    pub fn rt_before_device_reset(&self) {
        self.render_hook("rt_before_device_reset", |m| m.rt_before_device_reset(self));
    }

    /// Runs `rt_before_back_buffer_change`.
    pub fn rt_before_back_buffer_change(&self) {
        self.render_hook("rt_before_back_buffer_change", |m| {
            m.rt_before_back_buffer_change(self)
        });
    }

    /// Runs `rt_back_buffer_change`.
    pub fn rt_back_buffer_change(&self) {
        self.render_hook("rt_back_buffer_change", |m| m.rt_back_buffer_change(self));
    }

    /// Runs `rt_draw` with the interpolation factor.
    pub fn rt_draw(&self, alpha: f64) {
        self.render_hook("rt_draw", |m| m.rt_draw(self, alpha));
    }

    fn render_hook(&self, hook: &str, call: impl FnOnce(&dyn Module) -> bool) {
        if let Some(module) = self.module.get() {
            if !call(module.as_ref()) {
                self.fatal_error("Module", &format!("{hook} failed"));
            }
        }
    }

    // =========================================================================
    // SHUTDOWN AND FATAL ERRORS
    // =========================================================================

    /// Asks the module to shut down on its next tick. Idempotent.
    pub fn queue_shut_down(&self) {
        if !self.shutdown_queued.swap(true, Ordering::AcqRel) {
            tracing::info!("Shutdown queued");
        }
    }

    /// Whether a shutdown was queued.
    #[must_use]
    pub fn is_shut_down_queued(&self) -> bool {
        self.shutdown_queued.load(Ordering::Acquire)
    }

    /// Closes the application through the installed shutdown handler.
    pub fn shut_down(&self) {
        match self.shutdown_handler.lock().as_ref() {
            Some(handler) => handler(),
            None => tracing::warn!("shut_down called with no shutdown handler"),
        }
    }

    /// Reports an unrecoverable error and terminates the process.
    ///
    /// Only the first caller gets through; the lock is never released
    /// because the terminator does not return. A fatal error raised from
    /// inside `Module::panic` or the fatal handler terminates at once.
    pub fn fatal_error(&self, sender: &str, message: &str) -> ! {
        let Some(_scope) = FatalScope::enter() else {
            tracing::error!(sender, "FATAL while reporting a fatal error: {message}");
            (self.terminator)(1)
        };
        let _guard = self.fatal_lock.lock();
        tracing::error!(sender, "FATAL: {message}");
        if let Err(e) = std::io::stderr().flush() {
            tracing::debug!("stderr flush failed: {e}");
        }

        if let Some(module) = self.module.get() {
            module.panic();
        }
        if let Some(handler) = self.fatal_handler.lock().as_ref() {
            handler(sender, message);
        }
        (self.terminator)(1)
    }

    // =========================================================================
    // PREFERENCES
    // =========================================================================

    /// Current value of a preference.
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        self.preferences.lock().get(key).map(str::to_owned)
    }

    /// Sets a known preference. Unknown keys are ignored and return false.
    pub fn set_preference(&self, key: &str, value: &str) -> bool {
        self.preferences.lock().set(key, value)
    }

    /// Writes live render settings into the preferences and saves them to
    /// the user file.
    ///
    /// # Errors
    ///
    /// [`HostError::Core`](crate::HostError::Core) if the file cannot be
    /// written.
    pub fn save_preferences(&self) -> HostResult<()> {
        let mut prefs = self.preferences.lock();
        self.render_settings.snapshot().write_to(&mut prefs);
        prefs.save(&self.user_preferences)?;
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Mounted content.
    #[must_use]
    #[inline]
    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Save slots.
    #[must_use]
    #[inline]
    pub fn saves(&self) -> &SaveStore {
        &self.saves
    }

    /// Command line parameters.
    #[must_use]
    #[inline]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Startup settings snapshot.
    #[must_use]
    #[inline]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Live display settings.
    #[must_use]
    #[inline]
    pub fn render_settings(&self) -> &RenderSettings {
        &self.render_settings
    }

    /// Intent flags shared with the frame driver.
    #[must_use]
    pub fn intents(&self) -> Arc<WindowIntents> {
        Arc::clone(&self.intents)
    }

    /// Live frame statistics.
    #[must_use]
    #[inline]
    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn host_info(&self) -> HostInfo {
        self.stats.snapshot(self.settings.sim_fps)
    }

    /// Feature levels the module accepts, best first.
    #[must_use]
    pub fn compatible_feature_levels(&self) -> Vec<FeatureLevel> {
        self.factory.compatible_feature_levels()
    }

    /// Whether the module exists yet.
    #[must_use]
    pub fn has_module(&self) -> bool {
        self.module.get().is_some()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("settings", &self.settings)
            .field("has_module", &self.has_module())
            .field("shutdown_queued", &self.is_shut_down_queued())
            .finish_non_exhaustive()
    }
}
