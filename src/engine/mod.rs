//! The engine core: open/close lifecycle, Put/Get/Delete, the append
//! pipeline, active-file rotation, and the read-side plumbing shared by
//! [`crate::batch::WriteBatch`] and [`crate::merge`].

mod recovery;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::batch::{encode_seq_key, WriteBatch};
use crate::codec::{self, LogRecord, LogRecordPos};
use crate::data_file::DataFile;
use crate::error::{Error, Result};
use crate::io::IoType;
use crate::keydir::{self, Keydir};
use crate::lock::DirLock;
use crate::options::{Config, WriteBatchOptions};
use crate::utils;

/// A point-in-time snapshot of engine-level bookkeeping, exposed to
/// callers via [`Engine::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys in the keydir.
    pub key_num: usize,
    /// Number of data files currently open (active + older).
    pub data_file_num: usize,
    /// Bytes occupied by superseded (overwritten or tombstoned) records.
    pub reclaim_size: u64,
    /// Total on-disk size of the database directory.
    pub disk_size: u64,
}

/// State mutated in lockstep with every append: the active/older file set
/// and the byte counters that drive periodic sync and merge scheduling.
pub(crate) struct EngineState {
    pub(crate) active_file: Option<DataFile>,
    pub(crate) older_files: HashMap<u32, DataFile>,
    pub(crate) bytes_since_sync: u64,
    pub(crate) reclaim_size: u64,
}

impl EngineState {
    fn data_file(&self, file_id: u32) -> Option<&DataFile> {
        match &self.active_file {
            Some(active) if active.file_id == file_id => Some(active),
            _ => self.older_files.get(&file_id),
        }
    }
}

/// An open, embedded key-value store rooted at one directory.
///
/// Cheaply shareable across threads (every method takes `&self`); the
/// engine-wide `RwLock` and the keydir's own internal synchronization
/// together guarantee readers never observe a log append that is not yet
/// matched by a keydir update, or vice versa.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) keydir: Box<dyn Keydir>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) is_merging: AtomicBool,
    seq_no_file_existed: bool,
    is_initial: bool,
    _lock: DirLock,
}

impl Engine {
    /// Opens (creating if absent) the engine described by `config`.
    #[instrument(skip(config), fields(dir = %config.dir_path.display()))]
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let dir_existed = config.dir_path.exists();
        std::fs::create_dir_all(&config.dir_path)?;
        let is_initial = !dir_existed || std::fs::read_dir(&config.dir_path)?.next().is_none();

        let lock = DirLock::acquire(&config.dir_path)?;

        recovery::adopt_merge_files(&config.dir_path)?;

        let keydir = keydir::open(config.index_type, &config.dir_path, config.sync_writes)?;

        let (mut active_file, mut older_files) =
            recovery::load_data_files(&config.dir_path, config.mmap_at_start)?;

        let (seq_no, seq_no_file_existed, reclaim_size) =
            if config.index_type == keydir::IndexType::BPlusTree {
                let seq_no = recovery::load_seq_no(&config.dir_path)?;
                (seq_no.unwrap_or(0), seq_no.is_some(), 0)
            } else {
                recovery::load_index_from_hint_file(&config.dir_path, keydir.as_ref())?;
                let outcome = recovery::load_index_from_data_files(
                    &config.dir_path,
                    keydir.as_ref(),
                    &mut active_file,
                    &mut older_files,
                )?;
                (outcome.max_seq, false, outcome.reclaim_size)
            };

        if config.mmap_at_start {
            for (file_id, file) in older_files.iter_mut() {
                file.set_io_backend(&config.dir_path, *file_id, IoType::Standard)?;
            }
        }

        debug!(key_num = keydir.len()?, seq_no, "engine opened");

        Ok(Self {
            config,
            state: RwLock::new(EngineState {
                active_file,
                older_files,
                bytes_since_sync: 0,
                reclaim_size,
            }),
            keydir,
            seq_no: AtomicU64::new(seq_no),
            is_merging: AtomicBool::new(false),
            seq_no_file_existed,
            is_initial,
            _lock: lock,
        })
    }

    /// Inserts or overwrites `key` with `value`. Rejects an empty key.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let record = LogRecord::normal(encode_seq_key(0, &key), value.into());
        let mut state = self.state.write();
        let pos = self.append_locked(&mut state, &record)?;
        let old = self.keydir.put(key, pos)?;
        if let Some(old_pos) = old {
            state.reclaim_size += old_pos.size as u64;
        }
        Ok(())
    }

    /// Looks up `key`. Returns [`Error::KeyNotFound`] if absent or
    /// tombstoned.
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let state = self.state.read();
        let pos = self.keydir.get(key)?.ok_or(Error::KeyNotFound)?;
        self.read_value_at(&state, pos)
    }

    /// Removes `key`. A no-op (not an error) if the key is already absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let mut state = self.state.write();
        if self.keydir.get(key)?.is_none() {
            return Ok(());
        }

        let record = LogRecord::deleted(encode_seq_key(0, key));
        let pos = self.append_locked(&mut state, &record)?;
        state.reclaim_size += pos.size as u64;

        let (old, removed) = self.keydir.delete(key)?;
        if !removed {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old_pos) = old {
            state.reclaim_size += old_pos.size as u64;
        }
        Ok(())
    }

    /// Fsyncs the active file.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read();
        if let Some(active) = &state.active_file {
            active.sync()?;
        }
        Ok(())
    }

    /// Returns every key in ascending lexicographic order.
    pub fn list_keys(&self) -> Result<Vec<Bytes>> {
        let _state = self.state.read();
        let mut keys = Vec::with_capacity(self.keydir.len()?);
        let mut iter = self.keydir.iter(false)?;
        iter.rewind();
        while iter.valid() {
            keys.push(iter.key());
            iter.next();
        }
        Ok(keys)
    }

    /// Visits every live `(key, value)` pair in ascending key order until
    /// `f` returns `false` or the keydir is exhausted.
    pub fn fold(&self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let state = self.state.read();
        let mut iter = self.keydir.iter(false)?;
        iter.rewind();
        while iter.valid() {
            let value = self.read_value_at(&state, iter.value())?;
            if !f(&iter.key(), &value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    /// Reports live key count, open file count, reclaimable bytes and
    /// total directory size.
    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read();
        Ok(Stat {
            key_num: self.keydir.len()?,
            data_file_num: state.older_files.len() + state.active_file.is_some() as usize,
            reclaim_size: state.reclaim_size,
            disk_size: utils::dir_size(&self.config.dir_path)?,
        })
    }

    /// Copies the database directory (excluding the advisory lock file)
    /// into `dest`.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let _state = self.state.read();
        utils::copy_dir_excluding_lock(&self.config.dir_path, dest)
    }

    /// Creates a batch through which puts/deletes become visible together,
    /// atomically, at `commit`.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if self.config.index_type == keydir::IndexType::BPlusTree
            && !self.seq_no_file_existed
            && !self.is_initial
        {
            return Err(Error::UnableToRecoverSeqNo);
        }
        Ok(WriteBatch::new(self, options))
    }

    /// Closes the engine: flushes the keydir, snapshots the seq counter
    /// (on-disk B+Tree backend only) and closes every open file. Consumes
    /// `self`, so a closed engine cannot be used again; the directory lock
    /// is released when the returned value (or an error path's `self`) is
    /// dropped.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        let mut state = self.state.write();
        if state.active_file.is_none() {
            return Ok(());
        }

        self.keydir.close()?;

        if self.config.index_type == keydir::IndexType::BPlusTree {
            let seq_no = self.seq_no.load(Ordering::SeqCst).to_string();
            let mut seq_file = DataFile::open_seq_no_file(&self.config.dir_path)?;
            let record = LogRecord::normal(
                Bytes::from_static(utils::SEQ_NO_FILE_NAME.as_bytes()),
                Bytes::from(seq_no.into_bytes()),
            );
            let (buf, _) = codec::encode_log_record(&record);
            seq_file.write(&buf)?;
            seq_file.sync()?;
        }

        if let Some(active) = state.active_file.as_ref() {
            active.close()?;
        }
        for file in state.older_files.values() {
            file.close()?;
        }
        debug!("engine closed");
        Ok(())
    }

    /// Encodes `record`, rotating the active file first if it would
    /// overflow `config.data_file_size`, then appends it and applies the
    /// engine's sync policy. Returns the pointer to the newly written
    /// record.
    pub(crate) fn append_locked(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        if state.active_file.is_none() {
            state.active_file = Some(self.open_active_data_file(0)?);
        }

        let (buf, size) = codec::encode_log_record(record);

        let active = state.active_file.as_ref().unwrap();
        if active.write_off + size as i64 > self.config.data_file_size.as_u64() as i64 {
            active.sync()?;
            let old_id = active.file_id;
            let old_file = state.active_file.take().unwrap();
            state.older_files.insert(old_id, old_file);
            state.active_file = Some(self.open_active_data_file(old_id + 1)?);
            debug!(new_active_file_id = old_id + 1, "rotated active file");
        }

        let active = state.active_file.as_mut().unwrap();
        let write_off = active.write_off;
        active.write(&buf)?;

        state.bytes_since_sync += size as u64;
        let should_sync = self.config.sync_writes
            || (self.config.bytes_per_sync > 0 && state.bytes_since_sync > self.config.bytes_per_sync);
        if should_sync {
            active.sync()?;
            state.bytes_since_sync = 0;
        }

        Ok(LogRecordPos {
            file_id: active.file_id,
            offset: write_off,
            size: size as u32,
        })
    }

    fn open_active_data_file(&self, file_id: u32) -> Result<DataFile> {
        DataFile::open(&self.config.dir_path, file_id, IoType::Standard)
    }

    fn read_value_at(&self, state: &EngineState, pos: LogRecordPos) -> Result<Bytes> {
        let file = state
            .data_file(pos.file_id)
            .ok_or(Error::DataFileNotFound(pos.file_id))?;
        let read = file
            .read_log_record(pos.offset)?
            .ok_or(Error::DataFileNotFound(pos.file_id))?;
        if read.record.record_type == codec::LogRecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(read.record.value)
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
    }
}
