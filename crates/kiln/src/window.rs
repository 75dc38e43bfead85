//! # Window Messages and Device Intents
//!
//! The message thread never touches the swapchain. It records what the
//! window wants in [`WindowIntents`] and the render thread consumes those
//! intents once per frame.
//!
//! ```text
//!   OS / tests ──WindowMessage──► message loop ──store──► WindowIntents
//!                                                             │ take_*
//!                                                             ▼
//!                                                        render thread
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

/// Why the window was resized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeKind {
    /// Restored to a normal size.
    Restored,
    /// Minimized to the taskbar.
    Minimized,
    /// Maximized.
    Maximized,
}

/// Messages delivered to the message loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowMessage {
    /// The client area changed size.
    Size {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
        /// Kind of resize.
        kind: ResizeKind,
    },
    /// The user started dragging the window border.
    EnterSizeMove,
    /// The user released the window border.
    ExitSizeMove,
    /// Fullscreen toggle (Alt+Enter).
    ToggleFullscreen,
    /// Close requested, by the user or by [`WindowCloser::close_window`].
    Close,
    /// The window is gone; ends the message loop.
    Destroy,
}

/// Pending screen mode switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ScreenMode {
    /// No switch pending.
    Unchanged = 0,
    /// Switch to fullscreen.
    Fullscreen = 1,
    /// Switch to windowed.
    Windowed = 2,
}

impl ScreenMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Fullscreen,
            2 => Self::Windowed,
            _ => Self::Unchanged,
        }
    }
}

/// Atomic intent flags shared by the message and render threads.
#[derive(Debug)]
pub struct WindowIntents {
    resize: AtomicBool,
    back_buffer_change: AtomicBool,
    minimized: AtomicBool,
    fullscreen: AtomicBool,
    screen_mode: AtomicU8,
    width: AtomicU32,
    height: AtomicU32,
}

impl WindowIntents {
    /// Creates intents for a window of the given size with nothing pending.
    #[must_use]
    pub fn new(width: u32, height: u32, fullscreen: bool) -> Self {
        Self {
            resize: AtomicBool::new(false),
            back_buffer_change: AtomicBool::new(false),
            minimized: AtomicBool::new(false),
            fullscreen: AtomicBool::new(fullscreen),
            screen_mode: AtomicU8::new(ScreenMode::Unchanged as u8),
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
        }
    }

    /// Requests a backbuffer resize on the next frame.
    pub fn request_resize(&self) {
        self.resize.store(true, Ordering::Release);
    }

    /// Consumes a pending resize.
    pub fn take_resize(&self) -> bool {
        self.resize.swap(false, Ordering::AcqRel)
    }

    /// Requests swapchain recreation on the next frame.
    pub fn queue_back_buffer_change(&self) {
        self.back_buffer_change.store(true, Ordering::Release);
    }

    /// Consumes a pending backbuffer change.
    pub fn take_back_buffer_change(&self) -> bool {
        self.back_buffer_change.swap(false, Ordering::AcqRel)
    }

    /// Requests a screen mode switch, replacing any pending one.
    pub fn request_screen_mode(&self, mode: ScreenMode) {
        self.screen_mode.store(mode as u8, Ordering::Release);
    }

    /// Consumes the pending screen mode switch.
    pub fn take_screen_mode(&self) -> ScreenMode {
        ScreenMode::from_u8(
            self.screen_mode
                .swap(ScreenMode::Unchanged as u8, Ordering::AcqRel),
        )
    }

    /// Flips the desired fullscreen state and queues the matching switch.
    pub fn toggle_fullscreen(&self) {
        let fullscreen = !self.fullscreen.fetch_xor(true, Ordering::AcqRel);
        self.request_screen_mode(if fullscreen {
            ScreenMode::Fullscreen
        } else {
            ScreenMode::Windowed
        });
    }

    /// Desired fullscreen state.
    #[must_use]
    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Acquire)
    }

    /// Records whether the window is minimized.
    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.store(minimized, Ordering::Release);
    }

    /// Whether drawing is suspended.
    #[must_use]
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::Acquire)
    }

    /// Records the client area size.
    pub fn set_size(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::Release);
        self.height.store(height, Ordering::Release);
    }

    /// Last recorded client area size.
    #[must_use]
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }
}

/// Cloneable handle that closes the window from any thread.
#[derive(Debug, Clone)]
pub struct WindowCloser {
    internal: Arc<AtomicBool>,
    sender: Sender<WindowMessage>,
}

impl WindowCloser {
    pub(crate) fn new(internal: Arc<AtomicBool>, sender: Sender<WindowMessage>) -> Self {
        Self { internal, sender }
    }

    /// Starts an internal shutdown: the render thread is stopped and the
    /// message loop ends.
    pub fn close_window(&self) {
        self.internal.store(true, Ordering::Release);
        if self.sender.send(WindowMessage::Close).is_err() {
            tracing::debug!("close_window after the message loop exited");
        }
    }
}

/// Tracks border dragging so a drag produces one resize, at the end.
#[derive(Debug, Default)]
pub(crate) struct SizeMoveTracker {
    resizing: bool,
    size_at_enter: (u32, u32),
}

impl SizeMoveTracker {
    /// Applies one sizing message to `intents`.
    pub(crate) fn handle(&mut self, intents: &WindowIntents, message: WindowMessage) {
        match message {
            WindowMessage::Size {
                width,
                height,
                kind,
            } => {
                intents.set_size(width, height);
                match kind {
                    ResizeKind::Minimized => intents.set_minimized(true),
                    ResizeKind::Maximized => {
                        intents.set_minimized(false);
                        intents.request_resize();
                    }
                    ResizeKind::Restored => {
                        if intents.is_minimized() {
                            intents.set_minimized(false);
                        } else if !self.resizing {
                            intents.request_resize();
                        }
                    }
                }
            }
            WindowMessage::EnterSizeMove => {
                self.resizing = true;
                self.size_at_enter = intents.size();
            }
            WindowMessage::ExitSizeMove => {
                self.resizing = false;
                if intents.size() != self.size_at_enter {
                    intents.request_resize();
                }
            }
            WindowMessage::ToggleFullscreen => intents.toggle_fullscreen(),
            WindowMessage::Close | WindowMessage::Destroy => {}
        }
    }
}
