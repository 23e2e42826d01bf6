//! Error kinds returned by the storage engine.

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the storage engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed a zero-length key.
    #[error("key is empty")]
    KeyEmpty,

    /// Lookup failed or found a tombstone.
    #[error("key not found")]
    KeyNotFound,

    /// The keydir reported that a delete removed nothing when one was
    /// expected to be removed.
    #[error("failed to update index")]
    IndexUpdateFailed,

    /// A record pointer refers to a file id that isn't open.
    #[error("data file {0} not found")]
    DataFileNotFound(u32),

    /// An entry matching `*.data` has a non-numeric prefix.
    #[error("data file directory is corrupted")]
    DataFileDirCorrupted,

    /// Record checksum mismatch during read.
    #[error("invalid CRC, log record may be corrupted")]
    InvalidCrc,

    /// Batch over capacity at commit.
    #[error("exceeded the max write batch number")]
    ExceedMaxBatchNum,

    /// Merge already running.
    #[error("merge is already in progress")]
    MergeInProgress,

    /// Merge policy gate not satisfied.
    #[error("merge ratio has not reached the configured threshold")]
    MergeRatioNotReached,

    /// Free disk space is less than the projected size of live data.
    #[error("not enough free disk space to perform a merge")]
    NoSpaceForMerge,

    /// Directory already locked by another instance.
    #[error("the database directory is already in use")]
    DatabaseInUse,

    /// A write batch was requested against a B+Tree-backed engine that has
    /// no durable seq-no snapshot to resume from.
    #[error("cannot create a write batch: no seq-no snapshot and the directory is not new")]
    UnableToRecoverSeqNo,

    /// `Config::dir_path` was empty.
    #[error("database directory path is empty")]
    DirPathEmpty,

    /// `Config::data_file_size` was zero or negative.
    #[error("data file size must be greater than 0")]
    DataFileSizeInvalid,

    /// I/O error propagated verbatim from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error propagated from the on-disk B+Tree keydir backend.
    #[error("index error: {0}")]
    Index(#[from] jammdb::Error),
}
