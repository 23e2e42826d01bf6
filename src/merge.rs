//! Compaction: rewrites still-live records into a fresh sibling directory,
//! emits a hint file, and marks the cutover point so the next `Open`
//! adopts the result atomically.

use std::sync::atomic::Ordering;

use bytes::Bytes;

use crate::batch::{encode_seq_key, parse_seq_key};
use crate::codec::{self, LogRecord, LogRecordPos};
use crate::data_file::DataFile;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::utils;

impl Engine {
    /// Runs compaction synchronously on the calling thread. Returns
    /// [`Error::MergeInProgress`], [`Error::MergeRatioNotReached`] or
    /// [`Error::NoSpaceForMerge`] if the caller-enforced policy gates
    /// aren't satisfied; this method never decides *when* to run, only
    /// whether the attempt made right now is admissible.
    pub fn merge(&self) -> Result<()> {
        if self.state.read().active_file.is_none() {
            return Ok(());
        }

        if self
            .is_merging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::MergeInProgress);
        }
        let result = self.run_merge();
        self.is_merging.store(false, Ordering::SeqCst);
        result
    }

    fn run_merge(&self) -> Result<()> {
        self.check_merge_preconditions()?;

        let (snapshot_ids, non_merge_file_id) = self.rotate_and_snapshot()?;

        let merge_dir = utils::merge_dir_path(&self.config.dir_path);
        if merge_dir.exists() {
            std::fs::remove_dir_all(&merge_dir)?;
        }
        std::fs::create_dir_all(&merge_dir)?;

        let mut merge_config = self.config.clone();
        merge_config.dir_path = merge_dir.clone();
        merge_config.sync_writes = false;
        let merge_engine = Engine::open(merge_config)?;

        let mut hint_file = DataFile::open_hint_file(&merge_dir)?;

        for file_id in snapshot_ids {
            self.rewrite_live_records(file_id, &merge_engine, &mut hint_file)?;
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        self.write_merge_finished_marker(&merge_dir, non_merge_file_id)?;
        Ok(())
    }

    fn check_merge_preconditions(&self) -> Result<()> {
        let stat = self.stat()?;
        if stat.reclaim_size == 0 || stat.disk_size == 0 {
            return Err(Error::MergeRatioNotReached);
        }
        let ratio = stat.reclaim_size as f64 / stat.disk_size as f64;
        if ratio < self.config.data_file_merge_ratio {
            return Err(Error::MergeRatioNotReached);
        }
        let live_bytes = stat.disk_size.saturating_sub(stat.reclaim_size);
        if utils::available_disk_size(&self.config.dir_path)? < live_bytes {
            return Err(Error::NoSpaceForMerge);
        }
        Ok(())
    }

    /// Rotates the active file into `older`, opens a fresh active file
    /// above it, and returns the sorted ids of every file now frozen for
    /// the merge scan plus the id of the new (non-merged) active file.
    fn rotate_and_snapshot(&self) -> Result<(Vec<u32>, u32)> {
        let mut state = self.state.write();
        if let Some(active) = state.active_file.as_ref() {
            active.sync()?;
        }
        if let Some(active) = state.active_file.take() {
            state.older_files.insert(active.file_id, active);
        }
        let non_merge_file_id = state.older_files.keys().copied().max().map_or(0, |m| m + 1);
        state.active_file = Some(DataFile::open(
            &self.config.dir_path,
            non_merge_file_id,
            crate::io::IoType::Standard,
        )?);

        let mut ids: Vec<u32> = state.older_files.keys().copied().collect();
        ids.sort_unstable();
        Ok((ids, non_merge_file_id))
    }

    /// Scans one frozen file, keeping only records whose keydir pointer
    /// still points back at them, and appends the survivors into the
    /// merge engine with `seq = 0`.
    fn rewrite_live_records(
        &self,
        file_id: u32,
        merge_engine: &Engine,
        hint_file: &mut DataFile,
    ) -> Result<()> {
        let mut offset: i64 = 0;
        loop {
            let read = {
                let state = self.state.read();
                let file = state
                    .older_files
                    .get(&file_id)
                    .ok_or(Error::DataFileNotFound(file_id))?;
                file.read_log_record(offset)?
            };
            let read = match read {
                Some(read) => read,
                None => break,
            };

            let pos = LogRecordPos {
                file_id,
                offset,
                size: read.size as u32,
            };
            let (raw_key, _seq) = parse_seq_key(&read.record.key);

            if let Some(current) = self.keydir.get(&raw_key)? {
                if current.file_id == pos.file_id && current.offset == pos.offset {
                    let record = LogRecord {
                        key: encode_seq_key(0, &raw_key),
                        value: read.record.value,
                        record_type: read.record.record_type,
                    };
                    let new_pos = {
                        let mut merge_state = merge_engine.state.write();
                        merge_engine.append_locked(&mut merge_state, &record)?
                    };
                    hint_file.write_hint_record(raw_key, new_pos)?;
                }
            }

            offset += read.size as i64;
        }
        Ok(())
    }

    fn write_merge_finished_marker(&self, merge_dir: &std::path::Path, non_merge_file_id: u32) -> Result<()> {
        let mut marker = DataFile::open_merge_finished_file(merge_dir)?;
        let record = LogRecord::normal(
            Bytes::from_static(b"merge-finished"),
            Bytes::from(non_merge_file_id.to_string().into_bytes()),
        );
        let (buf, _) = codec::encode_log_record(&record);
        marker.write(&buf)?;
        marker.sync()
    }
}
