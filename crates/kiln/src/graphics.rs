//! # Graphics Backend
//!
//! The device and swapchain behind the render thread. The concrete API is
//! an external collaborator; the frame driver only needs the calls below,
//! and it makes all of them from the render thread.
//!
//! Device loss (`Removed`/`Reset`) is the one recoverable failure: the
//! driver tears the device down and initializes it again without touching
//! the window. Any other failure is fatal.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Device capability tiers, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureLevel {
    /// Baseline tier.
    Level10_0,
    /// Baseline plus minor extensions.
    Level10_1,
    /// Compute and tessellation.
    Level11_0,
    /// Extended resource binding.
    Level11_1,
    /// Modern tier.
    Level12_0,
}

impl FeatureLevel {
    /// Every level, best first.
    pub const ALL: [FeatureLevel; 5] = [
        Self::Level12_0,
        Self::Level11_1,
        Self::Level11_0,
        Self::Level10_1,
        Self::Level10_0,
    ];
}

/// Failure reported by a device or swapchain call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device was removed (driver update, GPU unplugged, TDR).
    #[error("device removed")]
    Removed,
    /// The device was reset and its resources are gone.
    #[error("device reset")]
    Reset,
    /// Any other failure.
    #[error("device call failed: {0}")]
    Failed(String),
}

impl DeviceError {
    /// Returns true if recreating the device recovers from this error.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Removed | Self::Reset)
    }
}

/// Result type for backend calls.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Swapchain parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// Backbuffer width in pixels.
    pub width: u32,
    /// Backbuffer height in pixels.
    pub height: u32,
    /// Multisample level.
    pub multisample_level: u32,
}

/// Device and swapchain operations used by the frame driver.
pub trait GraphicsBackend: Send {
    /// Creates the device and swapchain, choosing the first of `levels`
    /// (best first) the hardware supports.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Failed`] if no level is supported or creation fails.
    fn init(&mut self, levels: &[FeatureLevel], desc: &SwapChainDesc) -> DeviceResult<FeatureLevel>;

    /// Destroys the swapchain and device. Safe to call when uninitialized.
    fn uninit(&mut self);

    /// Releases and recreates the swapchain with new parameters.
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn recreate_swap_chain(&mut self, desc: &SwapChainDesc) -> DeviceResult<()>;

    /// Resizes the backbuffers and recreates dependent views.
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn resize_buffers(&mut self, width: u32, height: u32) -> DeviceResult<()>;

    /// Whether the swapchain is currently fullscreen.
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn is_fullscreen(&self) -> DeviceResult<bool>;

    /// Enters or leaves fullscreen.
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn set_fullscreen(&mut self, fullscreen: bool) -> DeviceResult<()>;

    /// Display mode closest to `width` x `height`.
    fn closest_display_mode(&self, width: u32, height: u32) -> (u32, u32);

    /// Resizes the output target (window or display mode).
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn resize_target(&mut self, width: u32, height: u32) -> DeviceResult<()>;

    /// Clears the render targets.
    ///
    /// # Errors
    ///
    /// Any device failure.
    fn clear(&mut self) -> DeviceResult<()>;

    /// Presents the backbuffer.
    ///
    /// # Errors
    ///
    /// Any device failure, typically device loss.
    fn present(&mut self, vsync: bool) -> DeviceResult<()>;
}

/// Backend call kinds, used to inject failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendCall {
    /// [`GraphicsBackend::init`].
    Init,
    /// [`GraphicsBackend::recreate_swap_chain`].
    RecreateSwapChain,
    /// [`GraphicsBackend::resize_buffers`].
    ResizeBuffers,
    /// [`GraphicsBackend::set_fullscreen`].
    SetFullscreen,
    /// [`GraphicsBackend::resize_target`].
    ResizeTarget,
    /// [`GraphicsBackend::clear`].
    Clear,
    /// [`GraphicsBackend::present`].
    Present,
}

/// A call recorded by the [`HeadlessBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendOp {
    /// Device created at a feature level.
    Init(FeatureLevel),
    /// Device destroyed.
    Uninit,
    /// Swapchain recreated.
    RecreateSwapChain(SwapChainDesc),
    /// Backbuffers resized.
    ResizeBuffers(u32, u32),
    /// Fullscreen state changed.
    SetFullscreen(bool),
    /// Output target resized.
    ResizeTarget(u32, u32),
    /// Targets cleared.
    Clear,
    /// Frame presented.
    Present {
        /// Vsync flag of the present.
        vsync: bool,
    },
}

#[derive(Debug, Default)]
struct ProbeState {
    ops: Vec<BackendOp>,
    faults: Vec<(BackendCall, DeviceError)>,
}

/// Shared view into a [`HeadlessBackend`] after it moved to the render
/// thread.
#[derive(Debug, Clone, Default)]
pub struct BackendProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl BackendProbe {
    /// Makes the next `call` fail with `error`. Faults queue per call kind.
    pub fn inject(&self, call: BackendCall, error: DeviceError) {
        self.state.lock().faults.push((call, error));
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn ops(&self) -> Vec<BackendOp> {
        self.state.lock().ops.clone()
    }

    /// Number of successful presents.
    #[must_use]
    pub fn presents(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, BackendOp::Present { .. }))
            .count()
    }

    fn call(&self, call: BackendCall, op: BackendOp) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if let Some(index) = state.faults.iter().position(|(c, _)| *c == call) {
            let (_, error) = state.faults.remove(index);
            return Err(error);
        }
        state.ops.push(op);
        Ok(())
    }
}

/// Backend with no device: records calls and fails on demand.
#[derive(Debug)]
pub struct HeadlessBackend {
    supported: HashSet<FeatureLevel>,
    initialized: bool,
    fullscreen: bool,
    probe: BackendProbe,
}

impl HeadlessBackend {
    /// Creates a backend supporting `supported`, plus a probe into it.
    #[must_use]
    pub fn new(supported: &[FeatureLevel]) -> (Self, BackendProbe) {
        let probe = BackendProbe::default();
        let backend = Self {
            supported: supported.iter().copied().collect(),
            initialized: false,
            fullscreen: false,
            probe: probe.clone(),
        };
        (backend, probe)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn init(&mut self, levels: &[FeatureLevel], _desc: &SwapChainDesc) -> DeviceResult<FeatureLevel> {
        let level = levels
            .iter()
            .copied()
            .find(|level| self.supported.contains(level))
            .ok_or_else(|| DeviceError::Failed("no compatible feature level".to_owned()))?;
        self.probe.call(BackendCall::Init, BackendOp::Init(level))?;
        self.initialized = true;
        self.fullscreen = false;
        Ok(level)
    }

    fn uninit(&mut self) {
        if self.initialized {
            self.initialized = false;
            self.fullscreen = false;
            self.probe.state.lock().ops.push(BackendOp::Uninit);
        }
    }

    fn recreate_swap_chain(&mut self, desc: &SwapChainDesc) -> DeviceResult<()> {
        self.probe
            .call(BackendCall::RecreateSwapChain, BackendOp::RecreateSwapChain(*desc))
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> DeviceResult<()> {
        self.probe
            .call(BackendCall::ResizeBuffers, BackendOp::ResizeBuffers(width, height))
    }

    fn is_fullscreen(&self) -> DeviceResult<bool> {
        Ok(self.fullscreen)
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> DeviceResult<()> {
        self.probe
            .call(BackendCall::SetFullscreen, BackendOp::SetFullscreen(fullscreen))?;
        self.fullscreen = fullscreen;
        Ok(())
    }

    fn closest_display_mode(&self, width: u32, height: u32) -> (u32, u32) {
        (width, height)
    }

    fn resize_target(&mut self, width: u32, height: u32) -> DeviceResult<()> {
        self.probe
            .call(BackendCall::ResizeTarget, BackendOp::ResizeTarget(width, height))
    }

    fn clear(&mut self) -> DeviceResult<()> {
        self.probe.call(BackendCall::Clear, BackendOp::Clear)
    }

    fn present(&mut self, vsync: bool) -> DeviceResult<()> {
        self.probe.call(BackendCall::Present, BackendOp::Present { vsync })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: SwapChainDesc = SwapChainDesc {
        width: 640,
        height: 480,
        multisample_level: 1,
    };

    #[test]
    fn test_init_picks_best_supported_level() {
        let (mut backend, probe) =
            HeadlessBackend::new(&[FeatureLevel::Level10_0, FeatureLevel::Level11_0]);
        let level = backend.init(&FeatureLevel::ALL, &DESC).unwrap();
        assert_eq!(level, FeatureLevel::Level11_0);
        assert_eq!(probe.ops(), vec![BackendOp::Init(FeatureLevel::Level11_0)]);
    }

    #[test]
    fn test_init_without_common_level_fails() {
        let (mut backend, _probe) = HeadlessBackend::new(&[FeatureLevel::Level10_0]);
        let result = backend.init(&[FeatureLevel::Level12_0], &DESC);
        assert!(matches!(result, Err(DeviceError::Failed(_))));
    }

    #[test]
    fn test_injected_fault_fires_once() {
        let (mut backend, probe) = HeadlessBackend::new(&FeatureLevel::ALL);
        probe.inject(BackendCall::Present, DeviceError::Removed);

        let err = backend.present(true).unwrap_err();
        assert!(err.is_lost());
        assert!(backend.present(true).is_ok());
        assert_eq!(probe.presents(), 1);
        assert!(!DeviceError::Failed("x".into()).is_lost());
    }
}
