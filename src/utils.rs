//! Small filesystem helpers shared by the engine, recovery and merge code.

use std::path::{Path, PathBuf};

use crate::error::Result;

pub const DATA_FILE_NAME_SUFFIX: &str = ".data";
pub const HINT_FILE_NAME: &str = "hint-index";
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
pub const SEQ_NO_FILE_NAME: &str = "seq-no";
pub const LOCK_FILE_NAME: &str = "fileLock";
pub const MERGE_DIR_SUFFIX: &str = "-merge";

/// Builds the path of the zero-padded, 9-digit-id data file `file_id` inside
/// `dir`.
pub fn data_file_name<P: AsRef<Path>>(dir: P, file_id: u32) -> PathBuf {
    dir.as_ref().join(format!("{:09}{}", file_id, DATA_FILE_NAME_SUFFIX))
}

/// The sibling directory merge writes into and recovery adopts from.
pub fn merge_dir_path<P: AsRef<Path>>(dir: P) -> PathBuf {
    let dir = dir.as_ref();
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match dir.parent() {
        Some(parent) => parent.join(format!("{name}{MERGE_DIR_SUFFIX}")),
        None => PathBuf::from(format!("{name}{MERGE_DIR_SUFFIX}")),
    }
}

/// Returns the total size, in bytes, of every regular file under `dir`.
pub fn dir_size<P: AsRef<Path>>(dir: P) -> Result<u64> {
    let mut size = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            size += metadata.len();
        } else if metadata.is_dir() {
            size += dir_size(entry.path())?;
        }
    }
    Ok(size)
}

/// Returns the number of bytes available to an unprivileged user on the
/// filesystem backing `path`, mirroring the reference implementation's
/// `utils.AvailableDiskSize`.
pub fn available_disk_size<P: AsRef<Path>>(path: P) -> Result<u64> {
    Ok(fs2::available_space(path)?)
}

/// Parses the numeric id out of a data file name such as `000000012.data`.
pub fn parse_file_id(file_name: &str) -> Option<u32> {
    file_name
        .strip_suffix(DATA_FILE_NAME_SUFFIX)
        .and_then(|id| id.parse().ok())
}

/// Scans `dir` for `*.data` files and returns their ids in ascending order.
pub fn sorted_file_ids<P: AsRef<Path>>(dir: P) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(DATA_FILE_NAME_SUFFIX) {
            let id = parse_file_id(&name).ok_or(crate::error::Error::DataFileDirCorrupted)?;
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Copies the directory tree rooted at `src` into `dst`, skipping the
/// advisory lock file (a lock is local to one open instance and must not be
/// carried into a backup).
pub fn copy_dir_excluding_lock<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        if name == LOCK_FILE_NAME {
            continue;
        }
        let dst_path = dst.join(&name);
        if file_type.is_dir() {
            copy_dir_excluding_lock(entry.path(), dst_path)?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}
