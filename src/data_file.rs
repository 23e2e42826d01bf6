//! A data file owns one IO backend, tracks an append offset, and reads back
//! log records at given offsets.

use std::path::Path;

use crate::codec::{self, LogRecord, LogRecordPos, ReadLogRecord, MAX_LOG_RECORD_HEADER_SIZE};
use crate::error::Result;
use crate::io::{self, IoBackend, IoType};
use crate::utils;

/// A single append-only log file: either the active file, an older
/// (immutable) file, the hint file, the merge-finished marker, or the
/// seq-no snapshot — they all share the same record framing.
pub struct DataFile {
    pub file_id: u32,
    pub write_off: i64,
    io: Box<dyn IoBackend>,
}

impl DataFile {
    fn new(file_id: u32, io: Box<dyn IoBackend>) -> Result<Self> {
        let write_off = io.size()? as i64;
        Ok(Self {
            file_id,
            write_off,
            io,
        })
    }

    /// Opens (creating if absent) the data file numbered `file_id` under
    /// `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, file_id: u32, io_type: IoType) -> Result<Self> {
        let path = utils::data_file_name(dir, file_id);
        Self::new(file_id, io::open(path, io_type)?)
    }

    /// Opens the hint file under `dir`, creating it if absent.
    pub fn open_hint_file<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(utils::HINT_FILE_NAME);
        Self::new(0, io::open(path, IoType::Standard)?)
    }

    /// Opens the merge-finished marker file under `dir`.
    pub fn open_merge_finished_file<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(utils::MERGE_FINISHED_FILE_NAME);
        Self::new(0, io::open(path, IoType::Standard)?)
    }

    /// Opens the seq-no snapshot file under `dir`.
    pub fn open_seq_no_file<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(utils::SEQ_NO_FILE_NAME);
        Self::new(0, io::open(path, IoType::Standard)?)
    }

    /// Swaps the backend this data file reads/writes through, used to
    /// downgrade memory-mapped files to buffered after the startup scan.
    pub fn set_io_backend<P: AsRef<Path>>(&mut self, dir: P, file_id: u32, io_type: IoType) -> Result<()> {
        self.io.close()?;
        self.io = io::open(utils::data_file_name(dir, file_id), io_type)?;
        Ok(())
    }

    /// Reads and decodes the log record starting at `offset`. Returns
    /// `Ok(None)` at end of file.
    pub fn read_log_record(&self, offset: i64) -> Result<Option<ReadLogRecord>> {
        let file_size = self.io.size()?;
        let offset = offset as u64;
        if offset >= file_size {
            return Ok(None);
        }

        let header_bytes = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_bytes];
        self.io.read(&mut header_buf, offset)?;

        codec::decode_log_record(&header_buf, |n, header_size| {
            let mut buf = vec![0u8; n];
            self.io.read(&mut buf, offset + header_size as u64)?;
            Ok(buf)
        })
    }

    /// Appends `buf` and advances `write_off`.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.write(buf)?;
        self.write_off += n as i64;
        Ok(())
    }

    /// Encodes and appends a hint record mapping `key` to `pos`.
    pub fn write_hint_record(&mut self, key: bytes::Bytes, pos: LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key, codec::encode_log_record_pos(pos).into());
        let (buf, _) = codec::encode_log_record(&record);
        self.write(&buf)
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    pub fn close(&self) -> Result<()> {
        self.io.close()
    }
}
