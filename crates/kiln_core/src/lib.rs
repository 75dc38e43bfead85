//! # KILN Core
//!
//! Timing and configuration primitives shared by the engine host:
//! - [`FrameLimiter`] paces the simulation thread to a fixed rate
//! - [`FrameSignal`] hands completed simulation frames to the render thread
//! - [`Parameters`] and [`Preferences`] are parsed once at startup and then
//!   frozen into an [`EngineSettings`] snapshot
//!
//! ## Architecture Rules
//!
//! 1. **No hidden globals** - every primitive is constructed and passed down
//! 2. **Mutex where compound** - the limiter timestamp is read-modify-write
//! 3. **Condvar, not spin** - render never burns a core waiting on simulation
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_core::{FrameLimiter, FrameSignal};
//!
//! let limiter = FrameLimiter::new(60)?;
//! let signal = FrameSignal::new();
//! loop {
//!     // one simulation tick
//!     signal.signal();
//!     limiter.limit_fps();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod frame_limiter;
pub mod frame_signal;
pub mod params;
pub mod preferences;
pub mod settings;

pub use error::{CoreError, CoreResult, ErrorCode};
pub use frame_limiter::FrameLimiter;
pub use frame_signal::{FrameSignal, SignalWait};
pub use params::Parameters;
pub use preferences::{PreferenceSources, Preferences};
pub use settings::EngineSettings;
