//! # File Readers
//!
//! Open streams over VFS files. A reader owns its stream; dropping it closes
//! the file.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{VfsError, VfsResult};

/// A readable, seekable stream over one VFS file.
pub trait FileReader: Read + Seek + Send {
    /// Total size of the file in bytes.
    fn size(&self) -> u64;

    /// Current read position.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying stream.
    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Returns true once every byte has been read.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying stream.
    fn eof(&mut self) -> io::Result<bool> {
        Ok(self.position()? >= self.size())
    }
}

/// Buffered reader over a file on disk.
#[derive(Debug)]
pub struct PlainFileReader {
    file: BufReader<File>,
    size: u64,
}

impl PlainFileReader {
    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> VfsResult<Self> {
        let file = File::open(path).map_err(|e| VfsError::io(path, e))?;
        let size = file.metadata().map_err(|e| VfsError::io(path, e))?.len();
        Ok(Self {
            file: BufReader::new(file),
            size,
        })
    }
}

impl Read for PlainFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for PlainFileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FileReader for PlainFileReader {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Reader over bytes already decompressed into memory.
#[derive(Debug, Clone)]
pub struct MemoryFileReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemoryFileReader {
    /// Wraps `data`.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl Read for MemoryFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryFileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl FileReader for MemoryFileReader {
    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}
