//! Buffered, append-friendly file backend used for the active data file and
//! any older file not currently memory-mapped.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use parking_lot::Mutex;

use super::IoBackend;
use crate::error::Result;

/// Default mode bits used when creating a new data file.
const DATA_FILE_PERM: u32 = 0o644;

/// A buffered, append-only view of a single file.
pub struct FileIo {
    file: Mutex<File>,
}

impl FileIo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .mode(DATA_FILE_PERM)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl IoBackend for FileIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file.lock();
        file.read_at(buf, offset)?;
        Ok(buf.len())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut file = self.file.lock();
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // The file descriptor is released when `File` is dropped; nothing
        // else to flush for the buffered backend since every write already
        // goes straight to the OS via `write_all`.
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}
