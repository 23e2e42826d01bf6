//! Log record codec: encodes/decodes the variable-length records that make
//! up a data file, hint file, merge-finished marker and seq-no snapshot.
//!
//! Record layout (all integers little-endian unless noted):
//!
//! ```text
//! +----------+--------+----------------+------------------+-----+-------+
//! | crc (u32)| type(1)| key_size (varint) | value_size (varint) | key | value |
//! +----------+--------+----------------+------------------+-----+-------+
//! ```
//!
//! `key_size`/`value_size` use the zig-zag signed varint from [`crate::varint`];
//! the CRC32/IEEE checksum covers every byte after the CRC field itself.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::varint::{self, MAX_VARINT_LEN32};

/// Maximum size, in bytes, of a log record header (crc + type + two
/// varint-encoded sizes).
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 5 + 2 * MAX_VARINT_LEN32;

/// Discriminates the purpose of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    /// A normal put: the value is live.
    Normal = 0,
    /// A tombstone: shadows prior writes to the same key.
    Deleted = 1,
    /// Terminates a write batch; its own key/value carry no user data.
    TxnFinished = 2,
}

impl LogRecordType {
    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Deleted),
            2 => Ok(Self::TxnFinished),
            _ => Err(Error::InvalidCrc),
        }
    }
}

/// A decoded (or about-to-be-encoded) log record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub key: Bytes,
    pub value: Bytes,
    pub record_type: LogRecordType,
}

impl LogRecord {
    pub fn normal(key: Bytes, value: Bytes) -> Self {
        Self {
            key,
            value,
            record_type: LogRecordType::Normal,
        }
    }

    pub fn deleted(key: Bytes) -> Self {
        Self {
            key,
            value: Bytes::new(),
            record_type: LogRecordType::Deleted,
        }
    }

    pub fn txn_finished(key: Bytes) -> Self {
        Self {
            key,
            value: Bytes::new(),
            record_type: LogRecordType::TxnFinished,
        }
    }
}

/// The location and length of a record inside a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: i64,
    pub size: u32,
}

/// Encodes `record` and returns the bytes together with their length.
pub fn encode_log_record(record: &LogRecord) -> (Vec<u8>, usize) {
    let mut header = [0u8; MAX_LOG_RECORD_HEADER_SIZE];
    header[4] = record.record_type as u8;

    let mut index = 5;
    index += varint::put_varint(&mut header[index..], record.key.len() as i64);
    index += varint::put_varint(&mut header[index..], record.value.len() as i64);

    let size = index + record.key.len() + record.value.len();
    let mut buf = vec![0u8; size];
    buf[..index].copy_from_slice(&header[..index]);
    buf[index..index + record.key.len()].copy_from_slice(&record.key);
    buf[index + record.key.len()..].copy_from_slice(&record.value);

    let crc = crc32fast::hash(&buf[4..]);
    buf[..4].copy_from_slice(&crc.to_le_bytes());

    (buf, size)
}

/// Encodes a [`LogRecordPos`] for storage as a hint file's value.
pub fn encode_log_record_pos(pos: LogRecordPos) -> Vec<u8> {
    let mut buf = [0u8; 3 * crate::varint::MAX_VARINT_LEN64];
    let mut index = 0;
    index += varint::put_varint(&mut buf[index..], pos.file_id as i64);
    index += varint::put_varint(&mut buf[index..], pos.offset);
    index += varint::put_varint(&mut buf[index..], pos.size as i64);
    buf[..index].to_vec()
}

/// Decodes a [`LogRecordPos`] previously produced by [`encode_log_record_pos`].
pub fn decode_log_record_pos(buf: &[u8]) -> LogRecordPos {
    let mut index = 0;
    let (file_id, n) = varint::varint(&buf[index..]);
    index += n;
    let (offset, n) = varint::varint(&buf[index..]);
    index += n;
    let (size, _) = varint::varint(&buf[index..]);
    LogRecordPos {
        file_id: file_id as u32,
        offset,
        size: size as u32,
    }
}

/// A log record header that has been parsed out of a data file, paired with
/// the number of header bytes it occupied.
struct Header {
    crc: u32,
    record_type_byte: u8,
    key_size: i64,
    value_size: i64,
    header_size: usize,
}

/// Parses a header out of `buf`. Returns `None` if `buf` is too short to
/// contain even the minimal header, or if the header is the all-zero
/// end-of-file sentinel a torn write can leave behind.
fn decode_header(buf: &[u8]) -> Option<Header> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = u32::from_le_bytes(buf[..4].try_into().unwrap());
    let record_type_byte = buf[4];

    let mut index = 5;
    let (key_size, n) = varint::varint(&buf[index..]);
    index += n;
    let (value_size, n) = varint::varint(&buf[index..]);
    index += n;

    if crc == 0 && key_size == 0 && value_size == 0 {
        return None;
    }

    Some(Header {
        crc,
        record_type_byte,
        key_size,
        value_size,
        header_size: index,
    })
}

/// A record decoded from a data file, along with the total number of bytes
/// (header + key + value) it occupies on disk.
pub struct ReadLogRecord {
    pub record: LogRecord,
    pub size: usize,
}

/// Decodes a log record whose bytes start at `buf[0]`. `buf` must contain at
/// least the record's header; `read_tail` is invoked with the number of key
/// + value bytes still needed and the offset (relative to the start of the
/// record) at which they begin, and must return exactly that many bytes.
///
/// Returns `Ok(None)` on the end-of-file sentinel (a well-formed all-zero
/// header, which a torn write can leave at the tail of the active file).
pub fn decode_log_record(
    header_buf: &[u8],
    read_tail: impl FnOnce(usize, usize) -> Result<Vec<u8>>,
) -> Result<Option<ReadLogRecord>> {
    let header = match decode_header(header_buf) {
        Some(h) => h,
        None => return Ok(None),
    };

    let record_type = LogRecordType::from_u8(header.record_type_byte)?;
    let key_size = header.key_size as usize;
    let value_size = header.value_size as usize;

    let kv = if key_size > 0 || value_size > 0 {
        read_tail(key_size + value_size, header.header_size)?
    } else {
        Vec::new()
    };

    let key = Bytes::copy_from_slice(&kv[..key_size]);
    let value = Bytes::copy_from_slice(&kv[key_size..]);

    let mut crc_input = Vec::with_capacity(header.header_size - 4 + kv.len());
    crc_input.extend_from_slice(&header_buf[4..header.header_size]);
    crc_input.extend_from_slice(&kv);
    let crc = crc32fast::hash(&crc_input);
    if crc != header.crc {
        return Err(Error::InvalidCrc);
    }

    Ok(Some(ReadLogRecord {
        record: LogRecord {
            key,
            value,
            record_type,
        },
        size: header.header_size + key_size + value_size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(record: LogRecord) {
        let (buf, size) = encode_log_record(&record);
        assert_eq!(buf.len(), size);

        let header_len = MAX_LOG_RECORD_HEADER_SIZE.min(buf.len());
        let decoded = decode_log_record(&buf[..header_len], |n, off| {
            Ok(buf[off..off + n].to_vec())
        })
        .unwrap()
        .unwrap();

        assert_eq!(decoded.record.key, record.key);
        assert_eq!(decoded.record.value, record.value);
        assert_eq!(decoded.record.record_type, record.record_type);
        assert_eq!(decoded.size, size);
    }

    #[test]
    fn encodes_and_decodes_normal_record() {
        round_trip(LogRecord::normal(Bytes::from_static(b"name"), Bytes::from_static(b"trojan")));
    }

    #[test]
    fn encodes_and_decodes_deleted_record() {
        round_trip(LogRecord::deleted(Bytes::from_static(b"name")));
    }

    #[test]
    fn encodes_and_decodes_empty_value() {
        round_trip(LogRecord::normal(Bytes::from_static(b"k"), Bytes::new()));
    }

    #[test]
    fn flipping_any_byte_trips_invalid_crc() {
        let record = LogRecord::normal(Bytes::from_static(b"key"), Bytes::from_static(b"value"));
        let (buf, _) = encode_log_record(&record);

        for i in 0..buf.len() {
            let mut corrupted = buf.clone();
            corrupted[i] ^= 0xff;
            let header_len = MAX_LOG_RECORD_HEADER_SIZE.min(corrupted.len());
            let result = decode_log_record(&corrupted[..header_len], |n, off| {
                if off + n > corrupted.len() {
                    return Err(Error::InvalidCrc);
                }
                Ok(corrupted[off..off + n].to_vec())
            });
            // Either the checksum fails, or (rarely, for header-only flips
            // that happen to still parse as a differently-shaped record)
            // the header decode itself produces different framing; both
            // manifest as an error or a mismatched record, never a silent
            // pass-through of the original bytes.
            match result {
                Ok(Some(r)) => assert!(
                    r.record.key != record.key
                        || r.record.value != record.value
                        || i < 4,
                    "byte {i} flipped but record decoded identically"
                ),
                Ok(None) => {}
                Err(_) => {}
            }
        }
    }

    #[test]
    fn log_record_pos_round_trips() {
        let pos = LogRecordPos {
            file_id: 7,
            offset: 12345,
            size: 42,
        };
        let encoded = encode_log_record_pos(pos);
        let decoded = decode_log_record_pos(&encoded);
        assert_eq!(decoded, pos);
    }

    proptest! {
        #[test]
        fn round_trips_arbitrary_kv(key in prop::collection::vec(any::<u8>(), 1..64),
                                     value in prop::collection::vec(any::<u8>(), 0..256)) {
            round_trip(LogRecord::normal(Bytes::from(key), Bytes::from(value)));
        }
    }
}
