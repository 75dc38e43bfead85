//! # KILN Engine Host
//!
//! Runs a game [`Module`] on two threads behind a window:
//!
//! ```text
//!   ┌───────────────────────── AppFramework ─────────────────────────┐
//!   │ message loop ──intents──► render thread ──► GraphicsBackend    │
//!   │                               │ rt_*                           │
//!   │ sim thread ──st_*──► Host ◄───┘                                │
//!   │   FrameLimiter        ├── Vfs        (content)                 │
//!   │   FrameSignal ───►    ├── SaveStore  (two-phase saves)         │
//!   │                       ├── Preferences / RenderSettings         │
//!   │                       └── fatal_error ─► module.panic ─► exit  │
//!   └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **No globals** - the [`Host`] is built explicitly and shared as
//!    `Arc<Host>`
//! 2. **Render thread owns the device** - other threads only set intents
//! 3. **Two error tiers** - recoverable `Result`s, and a fatal channel
//!    that never returns
//!
//! ## Example
//!
//! ```rust,ignore
//! let host = Arc::new(Host::new(config, Box::new(MyGameFactory))?);
//! let app = Arc::new(EngineApp::new(Arc::clone(&host))?);
//! let (backend, _probe) = HeadlessBackend::new(&FeatureLevel::ALL);
//! let framework = AppFramework::new(backend, app, host.intents(), FrameDriverConfig::default());
//! let closer = framework.closer();
//! host.set_shutdown_handler(move || closer.close_window());
//! framework.run()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod app;
pub mod error;
pub mod framework;
pub mod graphics;
pub mod host;
pub mod module;
pub mod render_settings;
pub mod save;
pub mod stats;
pub mod window;

pub use app::EngineApp;
pub use error::{HostError, HostResult, SaveError, SaveResult};
pub use framework::{AppCallbacks, AppFramework, AppState, FrameDriverConfig, SharedAppState};
pub use graphics::{
    BackendCall, BackendOp, BackendProbe, DeviceError, DeviceResult, FeatureLevel,
    GraphicsBackend, HeadlessBackend, SwapChainDesc,
};
pub use host::{Host, HostConfig, Terminator};
pub use module::{Module, ModuleFactory, KILN_INTERFACE_VERSION};
pub use render_settings::RenderSettings;
pub use save::{PendingSave, SaveState, SaveStore};
pub use stats::{HostInfo, HostStats};
pub use window::{ResizeKind, ScreenMode, WindowCloser, WindowIntents, WindowMessage};
