//! # Host Error Types
//!
//! Recoverable errors returned across the engine boundary. Unrecoverable
//! conditions never surface here; they go through [`Host::fatal_error`].
//!
//! [`Host::fatal_error`]: crate::Host::fatal_error

use std::path::PathBuf;

use kiln_core::{CoreError, ErrorCode};
use kiln_vfs::VfsError;
use thiserror::Error;

/// Errors raised by the save store.
#[derive(Error, Debug)]
pub enum SaveError {
    /// Save names may only contain ASCII alphanumerics and spaces.
    #[error("invalid save name: {0:?}")]
    InvalidSaveName(String),

    /// `complete_save` found no staging directory for the name.
    #[error("no pending save: {0}")]
    NoPendingSave(String),

    /// No committed save exists with the name.
    #[error("save not found: {0}")]
    NotFound(String),

    /// The caller's buffer cannot hold the committed state file.
    #[error("buffer too small: {required} bytes required")]
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
    },

    /// A state file could not be serialized or parsed.
    #[error("invalid save state {path}: {reason}")]
    InvalidState {
        /// State file.
        path: PathBuf,
        /// Serializer message.
        reason: String,
    },

    /// File system failure.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl SaveError {
    /// Maps the error onto the engine's numeric taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSaveName(_) => ErrorCode::InvalidSaveName,
            Self::NoPendingSave(_) => ErrorCode::NoPendingSave,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            Self::InvalidState { .. } => ErrorCode::InvalidFormat,
            Self::Io { .. } => ErrorCode::InvalidFile,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for save operations.
pub type SaveResult<T> = Result<T, SaveError>;

/// Errors raised while building or driving the host.
#[derive(Error, Debug)]
pub enum HostError {
    /// Preferences, parameters or timing.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Mounting or reading content.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Save store failure.
    #[error(transparent)]
    Save(#[from] SaveError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        /// Thread name.
        name: &'static str,
        /// Spawn error.
        source: std::io::Error,
    },
}

impl HostError {
    /// Maps the error onto the engine's numeric taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Core(e) => e.code(),
            Self::Vfs(e) => e.code(),
            Self::Save(e) => e.code(),
            Self::Thread { .. } => ErrorCode::AllocatingBuffer,
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
