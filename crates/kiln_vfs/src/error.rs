//! # VFS Error Types

use std::path::PathBuf;

use kiln_core::ErrorCode;
use thiserror::Error;

/// Errors raised by the virtual file system.
#[derive(Error, Debug)]
pub enum VfsError {
    /// No node exists at the logical path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A node handle refers to a node that has been removed.
    #[error("stale node handle")]
    StaleNode,

    /// The caller's buffer is smaller than the number of results.
    #[error("buffer too small: {required} entries required")]
    BufferTooSmall {
        /// Number of entries the call would write.
        required: usize,
    },

    /// A physical path could not be mounted or opened as a file.
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// An archive could not be opened or its directory could not be read.
    #[error("invalid archive {path}: {reason}")]
    InvalidArchive {
        /// Physical path of the archive.
        path: PathBuf,
        /// Library message.
        reason: String,
    },

    /// An entry inside an archive could not be read.
    #[error("invalid archive entry {name}: {reason}")]
    InvalidArchiveFile {
        /// Entry name.
        name: String,
        /// Library message.
        reason: String,
    },

    /// An archive entry is too large to map.
    #[error("archive entry {name} too large: {size} bytes")]
    ArchiveFileTooLarge {
        /// Entry name.
        name: String,
        /// Uncompressed size.
        size: u64,
    },

    /// A name filter pattern failed to compile.
    #[error("invalid filter pattern: {0}")]
    InvalidFilter(String),

    /// I/O failure on a physical path.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl VfsError {
    /// Maps the error onto the engine's numeric taxonomy.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::StaleNode => ErrorCode::NotFound,
            Self::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            Self::InvalidFile(_) | Self::Io { .. } => ErrorCode::InvalidFile,
            Self::InvalidArchive { .. } => ErrorCode::InvalidArchive,
            Self::InvalidArchiveFile { .. } => ErrorCode::InvalidArchiveFile,
            Self::ArchiveFileTooLarge { .. } => ErrorCode::ArchiveFileTooLarge,
            Self::InvalidFilter(_) => ErrorCode::InvalidParameter,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;
