//! Recovery protocol run once at [`super::Engine::open`]: merge adoption,
//! data-file discovery, and keydir reconstruction.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::batch::parse_seq_key;
use crate::codec::{self, LogRecordPos, LogRecordType};
use crate::data_file::DataFile;
use crate::error::{Error, Result};
use crate::io::IoType;
use crate::keydir::Keydir;
use crate::utils;

/// Step (a): if a finished merge is waiting in the sibling `<dir>-merge`
/// directory, adopt it — deleting the superseded prefix of data files and
/// moving the merged set into place. An unfinished merge directory is
/// discarded untouched. Idempotent: running this with nothing to adopt is
/// a no-op.
pub(super) fn adopt_merge_files<P: AsRef<Path>>(dir_path: P) -> Result<()> {
    let dir_path = dir_path.as_ref();
    let merge_path = utils::merge_dir_path(dir_path);
    if !merge_path.exists() {
        return Ok(());
    }

    let finished_marker = merge_path.join(utils::MERGE_FINISHED_FILE_NAME);
    if !finished_marker.exists() {
        std::fs::remove_dir_all(&merge_path)?;
        return Ok(());
    }

    let non_merge_file_id = read_non_merge_file_id(&merge_path)?;

    for file_id in 0..non_merge_file_id {
        let path = utils::data_file_name(dir_path, file_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }

    for entry in std::fs::read_dir(&merge_path)? {
        let entry = entry?;
        let dest = dir_path.join(entry.file_name());
        std::fs::rename(entry.path(), dest)?;
    }

    std::fs::remove_dir_all(&merge_path)?;
    debug!(non_merge_file_id, "adopted finished merge");
    Ok(())
}

fn read_non_merge_file_id(merge_path: &Path) -> Result<u32> {
    let marker = DataFile::open_merge_finished_file(merge_path)?;
    let read = marker
        .read_log_record(0)?
        .ok_or(Error::DataFileDirCorrupted)?;
    std::str::from_utf8(&read.record.value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::DataFileDirCorrupted)
}

/// Step (b): discovers `*.data` files, opens all of them, and splits the
/// highest-id one out as `active`.
pub(super) fn load_data_files<P: AsRef<Path>>(
    dir_path: P,
    mmap_at_start: bool,
) -> Result<(Option<DataFile>, HashMap<u32, DataFile>)> {
    let dir_path = dir_path.as_ref();
    let file_ids = utils::sorted_file_ids(dir_path)?;

    let mut older_files = HashMap::new();
    let mut active_file = None;

    for (i, file_id) in file_ids.iter().enumerate() {
        let io_type = if mmap_at_start && i != file_ids.len() - 1 {
            IoType::Mmap
        } else {
            IoType::Standard
        };
        let file = DataFile::open(dir_path, *file_id, io_type)?;
        if i == file_ids.len() - 1 {
            active_file = Some(file);
        } else {
            older_files.insert(*file_id, file);
        }
    }

    Ok((active_file, older_files))
}

/// Replays the `seq-no` snapshot for the on-disk B+Tree backend (which
/// skips log replay entirely) and removes it; it is only ever valid for
/// the single recovery that reads it, and is rewritten fresh on the next
/// clean close.
pub(super) fn load_seq_no<P: AsRef<Path>>(dir_path: P) -> Result<Option<u64>> {
    let dir_path = dir_path.as_ref();
    let path = dir_path.join(utils::SEQ_NO_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let file = DataFile::open_seq_no_file(dir_path)?;
    let read = file.read_log_record(0)?.ok_or(Error::DataFileDirCorrupted)?;
    let seq_no = std::str::from_utf8(&read.record.value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::DataFileDirCorrupted)?;

    std::fs::remove_file(path)?;
    Ok(Some(seq_no))
}

/// Step (c), hint-file half: replays `hint-index` if present, restoring
/// every `(raw_key, pos)` pair it recorded without touching data files.
pub(super) fn load_index_from_hint_file<P: AsRef<Path>>(
    dir_path: P,
    keydir: &dyn Keydir,
) -> Result<()> {
    let dir_path = dir_path.as_ref();
    let path = dir_path.join(utils::HINT_FILE_NAME);
    if !path.exists() {
        return Ok(());
    }

    let hint_file = DataFile::open_hint_file(dir_path)?;
    let mut offset: i64 = 0;
    loop {
        match hint_file.read_log_record(offset) {
            Ok(Some(read)) => {
                let pos = codec::decode_log_record_pos(&read.record.value);
                keydir.put(read.record.key, pos)?;
                offset += read.size as i64;
            }
            Ok(None) => break,
            Err(Error::InvalidCrc) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// The bookkeeping recovered from scanning data-file tails.
pub(super) struct RecoveryOutcome {
    pub(super) max_seq: u64,
    pub(super) reclaim_size: u64,
}

/// Step (c), data-file half: scans every data file (starting after the
/// merge boundary if one was adopted) in ascending id order, replaying
/// non-transactional records immediately and buffering transactional ones
/// until their `TXN_FINISHED` terminator arrives.
pub(super) fn load_index_from_data_files<P: AsRef<Path>>(
    dir_path: P,
    keydir: &dyn Keydir,
    active_file: &mut Option<DataFile>,
    older_files: &mut HashMap<u32, DataFile>,
) -> Result<RecoveryOutcome> {
    let dir_path = dir_path.as_ref();

    let active_id = active_file.as_ref().map(|f| f.file_id);
    let mut file_ids: Vec<u32> = older_files.keys().copied().chain(active_id).collect();
    file_ids.sort_unstable();

    if file_ids.is_empty() {
        return Ok(RecoveryOutcome {
            max_seq: 0,
            reclaim_size: 0,
        });
    }

    let start_id = {
        let marker = dir_path.join(utils::MERGE_FINISHED_FILE_NAME);
        if marker.exists() {
            read_non_merge_file_id(dir_path)?
        } else {
            *file_ids.first().unwrap()
        }
    };

    let mut pending: HashMap<u64, Vec<(codec::LogRecord, LogRecordPos)>> = HashMap::new();
    let mut max_seq = 0u64;
    let mut reclaim_size = 0u64;

    for file_id in file_ids {
        if file_id < start_id {
            continue;
        }

        let mut offset: i64 = 0;
        loop {
            let read = {
                let file = if active_id == Some(file_id) {
                    active_file.as_ref().unwrap()
                } else {
                    older_files.get(&file_id).unwrap()
                };
                file.read_log_record(offset)
            };

            let read = match read {
                Ok(Some(read)) => read,
                Ok(None) => break,
                Err(Error::InvalidCrc) => break,
                Err(e) => return Err(e),
            };

            let pos = LogRecordPos {
                file_id,
                offset,
                size: read.size as u32,
            };
            let (raw_key, seq) = parse_seq_key(&read.record.key);
            max_seq = max_seq.max(seq);

            if seq == 0 {
                reclaim_size += apply_record(keydir, raw_key, read.record.record_type, pos)?;
            } else if read.record.record_type == LogRecordType::TxnFinished {
                if let Some(members) = pending.remove(&seq) {
                    for (record, member_pos) in members {
                        reclaim_size +=
                            apply_record(keydir, record.key, record.record_type, member_pos)?;
                    }
                }
            } else {
                pending.entry(seq).or_default().push((
                    codec::LogRecord {
                        key: raw_key,
                        value: read.record.value,
                        record_type: read.record.record_type,
                    },
                    pos,
                ));
            }

            offset += read.size as i64;
        }

        if active_id == Some(file_id) {
            active_file.as_mut().unwrap().write_off = offset;
        }
    }

    debug!(max_seq, discarded_batches = pending.len(), "recovery scan complete");
    Ok(RecoveryOutcome {
        max_seq,
        reclaim_size,
    })
}

/// Applies one already-durable record to the keydir, mirroring
/// [`super::Engine::put`]/[`super::Engine::delete`]'s bookkeeping without
/// re-appending anything. Returns the reclaim-size delta it caused.
fn apply_record(
    keydir: &dyn Keydir,
    key: bytes::Bytes,
    record_type: LogRecordType,
    pos: LogRecordPos,
) -> Result<u64> {
    match record_type {
        LogRecordType::Normal => {
            let old = keydir.put(key, pos)?;
            Ok(old.map(|p| p.size as u64).unwrap_or(0))
        }
        LogRecordType::Deleted => {
            let (old, _) = keydir.delete(&key)?;
            Ok(pos.size as u64 + old.map(|p| p.size as u64).unwrap_or(0))
        }
        LogRecordType::TxnFinished => Ok(0),
    }
}
