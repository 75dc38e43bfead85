//! # Core Error Types
//!
//! The numeric error taxonomy returned across the engine boundary, plus the
//! errors raised by timing and configuration primitives.

use std::path::PathBuf;

use thiserror::Error;

/// Stable numeric codes for every recoverable engine failure.
///
/// Codes below 1000 mirror the platform codes callers already branch on;
/// codes from 1001 are engine specific and never change meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// The requested file, save or preference does not exist.
    NotFound = 2,
    /// A parameter was malformed.
    InvalidParameter = 87,
    /// The caller's buffer cannot hold the result; the required size is reported.
    BufferTooSmall = 122,
    /// A buffer could not be allocated.
    AllocatingBuffer = 1001,
    /// A pooled resource (sound source, stream) has no free slot.
    NoFreeSources = 1002,
    /// An optional codec library failed to load.
    VorbisLibLoadFailed = 1003,
    /// Data was not in the expected format.
    InvalidFormat = 1004,
    /// An archive could not be opened or mapped.
    InvalidArchive = 1005,
    /// An entry inside an archive could not be read.
    InvalidArchiveFile = 1006,
    /// A file could not be opened or is not a file.
    InvalidFile = 1007,
    /// `complete_save` was called without a matching `begin_save`.
    NoPendingSave = 1008,
    /// A save name contained characters other than alphanumerics and spaces.
    InvalidSaveName = 1009,
    /// An archive entry is too large to be mapped.
    ArchiveFileTooLarge = 1010,
}

impl ErrorCode {
    /// Returns the numeric value of the code.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.value())
    }
}

/// Errors raised by core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A frame limiter was configured with a zero frame rate.
    #[error("invalid frame rate: {0} frames per second")]
    InvalidFrameRate(u32),

    /// A command line parameter could not be parsed.
    #[error("invalid parameter at byte {offset}: {reason}")]
    InvalidParameter {
        /// Byte offset of the offending token in the parsed string.
        offset: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A preference file could not be read or written.
    #[error("preference file {path}: {source}")]
    PreferenceIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A preference file is not a flat key/value table.
    #[error("malformed preference file {path}: {reason}")]
    MalformedPreferences {
        /// File that failed.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A required preference is absent.
    #[error("missing preference: {0}")]
    MissingPreference(String),

    /// A preference value could not be converted to its setting type.
    #[error("invalid value {value:?} for preference {key}")]
    InvalidPreference {
        /// Preference key.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl CoreError {
    /// Maps the error onto the engine's numeric taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidFrameRate(_) | Self::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Self::PreferenceIo { .. } => ErrorCode::InvalidFile,
            Self::MalformedPreferences { .. } | Self::InvalidPreference { .. } => {
                ErrorCode::InvalidFormat
            }
            Self::MissingPreference(_) => ErrorCode::NotFound,
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
