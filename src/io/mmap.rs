//! Read-only memory-mapped file backend, used to speed up the startup
//! recovery scan. Writes are rejected: the active file is never
//! memory-mapped, and older files are swapped back to [`super::FileIo`]
//! once the scan finishes (see `Engine::open`).

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::IoBackend;
use crate::error::Result;

pub struct MmapIo {
    mmap: Mutex<Option<Mmap>>,
}

impl MmapIo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).open(path)?;
        // SAFETY: the mapped file is owned exclusively by this store for its
        // lifetime; no other process writes to data files belonging to an
        // open instance (the advisory directory lock enforces this), and
        // this backend never mutates the mapping.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap: Mutex::new(Some(mmap)),
        })
    }
}

impl IoBackend for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let guard = self.mmap.lock();
        let mmap = guard.as_ref().expect("mmap read after close");
        let offset = offset as usize;
        let end = (offset + buf.len()).min(mmap.len());
        let n = end.saturating_sub(offset);
        buf[..n].copy_from_slice(&mmap[offset..end]);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        panic!("MmapIo::write is not implemented: memory-mapped files are read-only");
    }

    fn sync(&self) -> Result<()> {
        panic!("MmapIo::sync is not implemented: memory-mapped files are read-only");
    }

    fn close(&self) -> Result<()> {
        self.mmap.lock().take();
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let guard = self.mmap.lock();
        Ok(guard.as_ref().map(|m| m.len() as u64).unwrap_or(0))
    }
}
