//! # Frame Signal
//!
//! Single-slot handshake between the simulation thread (producer) and the
//! render thread (consumer).
//!
//! ```text
//!   sim:    tick ─ signal ─ tick ─ signal ─ signal ─ tick ─ signal
//!                    │                │        │               │
//!   slot:          [ready]          [ready] (merged)        [ready]
//!                    │                         │               │
//!   render:        wait ── draw ──────────── wait ── draw ── wait ── draw
//! ```
//!
//! Signals never queue: a consumer that falls behind sees one pending frame,
//! not a backlog. `close` releases any waiter permanently so shutdown never
//! hangs on a simulation thread that has already stopped.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Outcome of a timed wait on a [`FrameSignal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalWait {
    /// A frame was ready and has been consumed.
    Ready,
    /// The timeout elapsed with no frame.
    TimedOut,
    /// The signal was closed.
    Closed,
}

#[derive(Debug, Default)]
struct SlotState {
    ready: bool,
    closed: bool,
}

/// Condvar-backed single-slot "frame ready" flag.
#[derive(Debug, Default)]
pub struct FrameSignal {
    state: Mutex<SlotState>,
    condvar: Condvar,
}

impl FrameSignal {
    /// Creates an empty, open signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a frame as ready and wakes the consumer.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.ready = true;
        drop(state);
        self.condvar.notify_all();
    }

    /// Returns true if a frame is pending, without consuming it.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Returns true once [`FrameSignal::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Blocks until a frame is ready and consumes it.
    ///
    /// Returns `false` if the signal was closed instead.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.ready {
                state.ready = false;
                return true;
            }
            if state.closed {
                return false;
            }
            self.condvar.wait(&mut state);
        }
    }

    /// Like [`FrameSignal::wait`], but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> SignalWait {
        let mut state = self.state.lock();
        if !state.ready && !state.closed {
            self.condvar.wait_for(&mut state, timeout);
        }
        if state.ready {
            state.ready = false;
            SignalWait::Ready
        } else if state.closed {
            SignalWait::Closed
        } else {
            SignalWait::TimedOut
        }
    }

    /// Permanently releases all current and future waiters.
    ///
    /// A frame signalled before close is still delivered once.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.condvar.notify_all();
    }
}
