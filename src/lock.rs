//! Advisory, process-exclusive lock over a database directory.
//!
//! The reference implementation takes a `flock` on `<dir>/flock` inside
//! `Open` and releases it in `Close`; this mirrors that with `fs2`'s
//! portable advisory-lock wrapper over a sentinel file.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::utils::LOCK_FILE_NAME;

/// Holds the directory lock for as long as it lives; dropping it (or
/// calling [`DirLock::unlock`] explicitly) releases the lock.
pub struct DirLock {
    file: File,
}

impl DirLock {
    /// Attempts to acquire the lock on `dir`. Fails with
    /// [`Error::DatabaseInUse`] if another instance already holds it.
    pub fn acquire<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| Error::DatabaseInUse)?;
        Ok(Self { file })
    }

    /// Releases the lock. Equivalent to dropping the guard, but lets the
    /// caller observe and propagate an unlock failure.
    pub fn unlock(self) -> Result<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempdir().unwrap();
        let first = DirLock::acquire(dir.path()).unwrap();
        let err = DirLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DatabaseInUse));
        drop(first);
        assert!(DirLock::acquire(dir.path()).is_ok());
    }
}
