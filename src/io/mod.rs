//! Uniform byte-oriented file abstraction with two variants: buffered
//! read/write for active and older data files, and read-only memory-mapped
//! for fast recovery scans.

mod file;
mod mmap;

use std::path::Path;

pub use file::FileIo;
pub use mmap::MmapIo;

use crate::error::Result;

/// Which backend should be used to open a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Regular buffered file I/O, append-friendly and writable.
    Standard,
    /// Read-only memory-mapped I/O, used to speed up the recovery scan.
    Mmap,
}

/// A uniform interface over the bytes of a single file.
pub trait IoBackend: Send + Sync {
    /// Reads `buf.len()` bytes starting at `offset`.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Appends `buf` to the file, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flushes any buffered bytes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Closes the underlying file descriptor.
    fn close(&self) -> Result<()>;

    /// Returns the current size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// Opens `path` with the requested backend.
pub fn open<P: AsRef<Path>>(path: P, io_type: IoType) -> Result<Box<dyn IoBackend>> {
    match io_type {
        IoType::Standard => Ok(Box::new(FileIo::open(path)?)),
        IoType::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}
