//! # Application Frame Driver
//!
//! Three threads, one window:
//!
//! ```text
//!   caller (message thread)      sim thread              render thread
//!   ───────────────────────      ──────────              ─────────────
//!   init device
//!   spawn ──────────────────────► loop {                 before_first_draw
//!   spawn ───────────────────────────────────────────────► loop {
//!   loop {                          on_sim_tick            device change?
//!     recv(1ms) → intents           }                      clear
//!     idle → on_input_idle        on_sim_stopped           on_draw
//!   }                                                      present
//!   join sim                                             } uninit
//! ```
//!
//! The message thread only records intents. The render thread alone
//! touches the device, servicing at most one change per frame in priority
//! order: backbuffer change, resize, fullscreen, windowed.
//!
//! ## Closing
//!
//! - External close (window button): [`AppCallbacks::on_external_close`];
//!   the host queues a shutdown for the module.
//! - Internal close ([`WindowCloser::close_window`]): the render thread is
//!   stopped and joined, the loop ends, then the sim thread is joined.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{HostError, HostResult};
use crate::graphics::{DeviceError, DeviceResult, FeatureLevel, GraphicsBackend, SwapChainDesc};
use crate::window::{ScreenMode, SizeMoveTracker, WindowCloser, WindowIntents, WindowMessage};

/// Lifecycle of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AppState {
    /// Nothing created.
    Uninitialized = 0,
    /// Message channel open.
    WindowCreated = 1,
    /// Device and swapchain created.
    DeviceInitialized = 2,
    /// Threads running.
    Running = 3,
    /// Recreating a lost device.
    DeviceLost = 4,
    /// Threads stopping.
    ShuttingDown = 5,
    /// All threads joined.
    Terminated = 6,
}

impl AppState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WindowCreated,
            2 => Self::DeviceInitialized,
            3 => Self::Running,
            4 => Self::DeviceLost,
            5 => Self::ShuttingDown,
            6 => Self::Terminated,
            _ => Self::Uninitialized,
        }
    }
}

/// Atomically readable [`AppState`].
#[derive(Debug, Default)]
pub struct SharedAppState(AtomicU8);

impl SharedAppState {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> AppState {
        AppState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: AppState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: AppState, to: AppState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Frame driver tuning.
#[derive(Clone, Debug)]
pub struct FrameDriverConfig {
    /// How long the message loop waits for a message before going idle.
    pub idle_poll: Duration,
    /// Render thread sleep per frame while minimized.
    pub minimized_sleep: Duration,
    /// Delay between attempts to recreate a device that stays lost.
    pub device_retry_delay: Duration,
}

impl Default for FrameDriverConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_millis(1),
            minimized_sleep: Duration::from_millis(10),
            device_retry_delay: Duration::from_millis(50),
        }
    }
}

/// Application hooks driven by the frame driver.
///
/// `on_sim_*` run on the sim thread, `on_input_idle` and `on_external_close`
/// on the message thread, everything else on the render thread.
pub trait AppCallbacks: Send + Sync + 'static {
    /// One simulation tick, pacing included.
    fn on_sim_tick(&self);

    /// The sim thread is exiting.
    fn on_sim_stopped(&self) {}

    /// Blocks until the first simulation tick has completed.
    fn on_before_first_draw(&self) {}

    /// Draws one frame between clear and present.
    fn on_draw(&self);

    /// A frame was presented.
    fn on_after_present(&self) {}

    /// The device is about to be recreated.
    fn on_before_device_reset(&self) {}

    /// The backbuffer is about to be released.
    fn on_before_back_buffer_change(&self) {}

    /// The backbuffer was recreated.
    fn on_back_buffer_change(&self) {}

    /// The backbuffer is being resized to `width` x `height`.
    fn on_resize(&self, _width: u32, _height: u32) {}

    /// Switching to fullscreen; returns the desired display size.
    fn on_switch_to_fullscreen(&self) -> (u32, u32) {
        let desc = self.swap_chain_desc();
        (desc.width, desc.height)
    }

    /// Switching to windowed.
    fn on_switch_to_windowed(&self) {}

    /// The message queue is empty.
    fn on_input_idle(&self) {}

    /// The user asked to close the window.
    fn on_external_close(&self);

    /// The render thread is being stopped; release anything it waits on.
    fn on_render_stopping(&self) {}

    /// Unrecoverable failure.
    fn on_fatal(&self, sender: &str, message: &str) -> !;

    /// Swapchain parameters for (re)creation.
    fn swap_chain_desc(&self) -> SwapChainDesc;

    /// Acceptable device feature levels, best first.
    fn feature_levels(&self) -> Vec<FeatureLevel> {
        FeatureLevel::ALL.to_vec()
    }

    /// Vsync flag for the next present.
    fn vsync(&self) -> bool {
        true
    }
}

struct Shared {
    callbacks: Arc<dyn AppCallbacks>,
    intents: Arc<WindowIntents>,
    state: Arc<SharedAppState>,
    sim_running: AtomicBool,
    render_running: AtomicBool,
    config: FrameDriverConfig,
}

/// Owns the window channel and the device until [`AppFramework::run`].
pub struct AppFramework<B: GraphicsBackend + 'static> {
    backend: B,
    shared: Arc<Shared>,
    sender: Sender<WindowMessage>,
    receiver: Receiver<WindowMessage>,
    internal_close: Arc<AtomicBool>,
}

impl<B: GraphicsBackend + 'static> AppFramework<B> {
    /// Opens the window channel.
    #[must_use]
    pub fn new(
        backend: B,
        callbacks: Arc<dyn AppCallbacks>,
        intents: Arc<WindowIntents>,
        config: FrameDriverConfig,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let state = Arc::new(SharedAppState::default());
        state.set(AppState::WindowCreated);

        Self {
            backend,
            shared: Arc::new(Shared {
                callbacks,
                intents,
                state,
                sim_running: AtomicBool::new(true),
                render_running: AtomicBool::new(true),
                config,
            }),
            sender,
            receiver,
            internal_close: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sender for window messages, as the OS would deliver them.
    #[must_use]
    pub fn window_sender(&self) -> Sender<WindowMessage> {
        self.sender.clone()
    }

    /// Handle for closing the window from any thread.
    #[must_use]
    pub fn closer(&self) -> WindowCloser {
        WindowCloser::new(Arc::clone(&self.internal_close), self.sender.clone())
    }

    /// Handle for observing the lifecycle state.
    #[must_use]
    pub fn state(&self) -> Arc<SharedAppState> {
        Arc::clone(&self.shared.state)
    }

    /// Creates the device, starts both worker threads and runs the message
    /// loop until the window is destroyed. Both threads are joined before
    /// returning.
    ///
    /// # Errors
    ///
    /// [`HostError::Thread`] if a worker thread cannot be spawned. Device
    /// creation failures go through [`AppCallbacks::on_fatal`].
    pub fn run(self) -> HostResult<()> {
        let Self {
            mut backend,
            shared,
            sender,
            receiver,
            internal_close,
        } = self;

        init_device(&mut backend, &shared);
        shared.state.set(AppState::DeviceInitialized);

        let sim_shared = Arc::clone(&shared);
        let sim = thread::Builder::new()
            .name("kiln-sim".into())
            .spawn(move || {
                while sim_shared.sim_running.load(Ordering::Acquire) {
                    sim_shared.callbacks.on_sim_tick();
                }
                sim_shared.callbacks.on_sim_stopped();
            })
            .map_err(|source| HostError::Thread { name: "sim", source })?;

        let render_loop = RenderLoop {
            backend,
            shared: Arc::clone(&shared),
        };
        let render = match thread::Builder::new()
            .name("kiln-render".into())
            .spawn(move || render_loop.run())
        {
            Ok(handle) => handle,
            Err(source) => {
                stop_sim(&shared, sim);
                return Err(HostError::Thread {
                    name: "render",
                    source,
                });
            }
        };

        shared.state.set(AppState::Running);
        tracing::info!("Frame driver running");

        let mut render = Some(render);
        let mut tracker = SizeMoveTracker::default();
        loop {
            match receiver.recv_timeout(shared.config.idle_poll) {
                Ok(WindowMessage::Close) => {
                    if internal_close.load(Ordering::Acquire) {
                        shared.state.set(AppState::ShuttingDown);
                        stop_render(&shared, render.take());
                        if sender.send(WindowMessage::Destroy).is_err() {
                            break;
                        }
                    } else {
                        shared.callbacks.on_external_close();
                    }
                }
                Ok(WindowMessage::Destroy) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(message) => tracker.handle(&shared.intents, message),
                Err(RecvTimeoutError::Timeout) => shared.callbacks.on_input_idle(),
            }
        }

        shared.state.set(AppState::ShuttingDown);
        stop_render(&shared, render.take());
        stop_sim(&shared, sim);
        shared.state.set(AppState::Terminated);
        tracing::info!("Frame driver stopped");
        Ok(())
    }
}

impl<B: GraphicsBackend + 'static> std::fmt::Debug for AppFramework<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppFramework")
            .field("state", &self.shared.state.get())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

fn init_device<B: GraphicsBackend>(backend: &mut B, shared: &Shared) {
    let callbacks = &shared.callbacks;
    let desc = callbacks.swap_chain_desc();
    let level = match backend.init(&callbacks.feature_levels(), &desc) {
        Ok(level) => level,
        Err(e) => callbacks.on_fatal("AppFramework", &format!("device creation failed: {e}")),
    };
    if let Err(e) = backend.resize_buffers(desc.width, desc.height) {
        callbacks.on_fatal("AppFramework", &format!("backbuffer creation failed: {e}"));
    }
    restore_screen_mode(&shared.intents);
    tracing::info!(
        "Device created at {level:?}, {}x{} x{}",
        desc.width,
        desc.height,
        desc.multisample_level
    );
}

/// A fresh swapchain starts windowed; queues the switch back to fullscreen
/// if that is what the window wants.
fn restore_screen_mode(intents: &WindowIntents) {
    if intents.is_fullscreen() {
        intents.request_screen_mode(ScreenMode::Fullscreen);
    }
}

fn stop_render(shared: &Shared, handle: Option<JoinHandle<()>>) {
    shared.render_running.store(false, Ordering::Release);
    shared.callbacks.on_render_stopping();
    if let Some(handle) = handle {
        if handle.join().is_err() {
            tracing::error!("Render thread panicked");
        }
    }
}

fn stop_sim(shared: &Shared, handle: JoinHandle<()>) {
    shared.sim_running.store(false, Ordering::Release);
    if handle.join().is_err() {
        tracing::error!("Sim thread panicked");
    }
}

struct RenderLoop<B> {
    backend: B,
    shared: Arc<Shared>,
}

impl<B: GraphicsBackend> RenderLoop<B> {
    fn run(mut self) {
        self.shared.callbacks.on_before_first_draw();
        while self.shared.render_running.load(Ordering::Acquire) {
            if let Err(error) = self.frame() {
                self.recover(error);
            }
        }
        self.backend.uninit();
    }

    fn frame(&mut self) -> DeviceResult<()> {
        let shared = Arc::clone(&self.shared);
        let intents = &shared.intents;

        if intents.take_back_buffer_change() {
            self.change_back_buffer()?;
        } else if intents.take_resize() {
            let (width, height) = intents.size();
            shared.callbacks.on_resize(width, height);
            self.resize(width, height)?;
        } else {
            match intents.take_screen_mode() {
                ScreenMode::Fullscreen => {
                    let (width, height) = shared.callbacks.on_switch_to_fullscreen();
                    let (width, height) = self.backend.closest_display_mode(width, height);
                    self.backend.resize_target(width, height)?;
                    self.backend.set_fullscreen(true)?;
                }
                ScreenMode::Windowed => {
                    shared.callbacks.on_switch_to_windowed();
                    self.backend.set_fullscreen(false)?;
                }
                ScreenMode::Unchanged => {}
            }
        }

        if intents.is_minimized() {
            thread::sleep(shared.config.minimized_sleep);
            return Ok(());
        }

        self.backend.clear()?;
        shared.callbacks.on_draw();
        self.backend.present(shared.callbacks.vsync())?;
        shared.callbacks.on_after_present();
        Ok(())
    }

    /// Recreates the swapchain, leaving and re-entering fullscreen around it.
    fn change_back_buffer(&mut self) -> DeviceResult<()> {
        let callbacks = Arc::clone(&self.shared.callbacks);
        let was_fullscreen = self.backend.is_fullscreen()?;
        if was_fullscreen {
            self.backend.set_fullscreen(false)?;
        }

        callbacks.on_before_back_buffer_change();
        let desc = callbacks.swap_chain_desc();
        self.backend.recreate_swap_chain(&desc)?;

        if was_fullscreen {
            self.backend.set_fullscreen(true)?;
        }
        self.backend.resize_buffers(desc.width, desc.height)?;
        callbacks.on_back_buffer_change();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> DeviceResult<()> {
        let callbacks = Arc::clone(&self.shared.callbacks);
        callbacks.on_before_back_buffer_change();
        self.backend.resize_buffers(width, height)?;
        callbacks.on_back_buffer_change();
        Ok(())
    }

    fn recover(&mut self, mut error: DeviceError) {
        let callbacks = Arc::clone(&self.shared.callbacks);
        loop {
            if !error.is_lost() {
                callbacks.on_fatal("AppFramework", &format!("device failure: {error}"));
            }
            tracing::warn!("Device lost ({error}), reinitializing");
            self.shared.state.transition(AppState::Running, AppState::DeviceLost);

            match self.reinit() {
                Ok(()) => break,
                Err(next) => error = next,
            }
            if !self.shared.render_running.load(Ordering::Acquire) {
                return;
            }
            thread::sleep(self.shared.config.device_retry_delay);
        }
        self.shared.state.transition(AppState::DeviceLost, AppState::Running);
        tracing::info!("Device recovered");
    }

    fn reinit(&mut self) -> DeviceResult<()> {
        let callbacks = Arc::clone(&self.shared.callbacks);
        callbacks.on_before_device_reset();
        self.backend.uninit();

        let desc = callbacks.swap_chain_desc();
        self.backend.init(&callbacks.feature_levels(), &desc)?;
        self.resize(desc.width, desc.height)?;
        restore_screen_mode(&self.shared.intents);
        Ok(())
    }
}
