//! Engine configuration: a chainable `Config` builder over this engine's
//! tunables.

use std::path::PathBuf;

use bytesize::ByteSize;

use crate::error::{Error, Result};
use crate::keydir::IndexType;

/// Configuration for an [`crate::Engine`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) dir_path: PathBuf,
    pub(crate) data_file_size: ByteSize,
    pub(crate) sync_writes: bool,
    pub(crate) bytes_per_sync: u64,
    pub(crate) index_type: IndexType,
    pub(crate) mmap_at_start: bool,
    pub(crate) data_file_merge_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::new(),
            data_file_size: ByteSize::mib(256),
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::OrderedTree,
            mmap_at_start: false,
            data_file_merge_ratio: 0.5,
        }
    }
}

impl Config {
    /// Creates a config rooted at `dir_path`, with every other tunable at
    /// its default.
    pub fn new<P: Into<PathBuf>>(dir_path: P) -> Self {
        Self {
            dir_path: dir_path.into(),
            ..Self::default()
        }
    }

    /// Opens (or creates) the engine at this config's `dir_path`.
    pub fn open(self) -> Result<crate::Engine> {
        crate::Engine::open(self)
    }

    /// Set the directory the engine persists into. Required to be
    /// non-empty.
    pub fn dir_path<P: Into<PathBuf>>(&mut self, dir_path: P) -> &mut Self {
        self.dir_path = dir_path.into();
        self
    }

    /// Set the size threshold that rotates the active file. Default
    /// `256 MiB`.
    pub fn data_file_size(&mut self, data_file_size: ByteSize) -> &mut Self {
        self.data_file_size = data_file_size;
        self
    }

    /// Fsync the active file after every write. Default `false`.
    pub fn sync_writes(&mut self, sync_writes: bool) -> &mut Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Fsync the active file once this many bytes have accumulated since
    /// the last sync. `0` disables periodic sync. Default `0`.
    pub fn bytes_per_sync(&mut self, bytes_per_sync: u64) -> &mut Self {
        self.bytes_per_sync = bytes_per_sync;
        self
    }

    /// Select the keydir backend. Default [`IndexType::OrderedTree`].
    pub fn index_type(&mut self, index_type: IndexType) -> &mut Self {
        self.index_type = index_type;
        self
    }

    /// Open older data files memory-mapped during the recovery scan.
    /// Default `false`.
    pub fn mmap_at_start(&mut self, mmap_at_start: bool) -> &mut Self {
        self.mmap_at_start = mmap_at_start;
        self
    }

    /// Set the reclaim-to-total-size ratio above which `merge()` proceeds.
    /// Default `0.5`.
    ///
    /// # Panics
    ///
    /// Panics if `ratio` is outside `[0.0, 1.0]`.
    pub fn data_file_merge_ratio(&mut self, ratio: f64) -> &mut Self {
        assert!((0.0..=1.0).contains(&ratio));
        self.data_file_merge_ratio = ratio;
        self
    }

    /// Validates required invariants: non-empty `dir_path`, positive
    /// `data_file_size`.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::DirPathEmpty);
        }
        if self.data_file_size.as_u64() == 0 {
            return Err(Error::DataFileSizeInvalid);
        }
        Ok(())
    }
}

/// Options governing a single [`crate::WriteBatch`].
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchOptions {
    pub(crate) max_write_batch_num: usize,
    pub(crate) sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_write_batch_num: 10_000,
            sync_writes: true,
        }
    }
}

impl WriteBatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of buffered operations a batch may hold
    /// before `commit` fails. Default `10000`.
    pub fn max_write_batch_num(&mut self, max_write_batch_num: usize) -> &mut Self {
        self.max_write_batch_num = max_write_batch_num;
        self
    }

    /// Fsync the active file when this batch commits. Default `true`.
    pub fn sync_writes(&mut self, sync_writes: bool) -> &mut Self {
        self.sync_writes = sync_writes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_dir_path() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(Error::DirPathEmpty)));
    }

    #[test]
    fn rejects_zero_data_file_size() {
        let mut config = Config::new("/tmp/logcask-test");
        config.data_file_size(ByteSize::b(0));
        assert!(matches!(config.validate(), Err(Error::DataFileSizeInvalid)));
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = Config::new("/tmp/logcask-test");
        assert!(config.validate().is_ok());
    }
}
