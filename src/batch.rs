//! Atomic multi-key writes layered on top of the append log via a
//! monotonic transaction sequence number and a `TXN_FINISHED` terminator.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::codec::LogRecord;
use crate::codec::LogRecordType;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::options::WriteBatchOptions;
use crate::varint;

const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prepends `varuint(seq)` to `key`, the wrapper every on-disk key carries
/// so recovery can distinguish transactional writes and group batch
/// members.
pub(crate) fn encode_seq_key(seq: u64, key: &[u8]) -> Bytes {
    let mut seq_buf = [0u8; varint::MAX_VARINT_LEN64];
    let n = varint::put_uvarint(&mut seq_buf, seq);
    let mut out = Vec::with_capacity(n + key.len());
    out.extend_from_slice(&seq_buf[..n]);
    out.extend_from_slice(key);
    Bytes::from(out)
}

/// Splits a wrapped on-disk key back into `(raw_key, seq)`.
pub(crate) fn parse_seq_key(encoded: &Bytes) -> (Bytes, u64) {
    let (seq, n) = varint::uvarint(encoded);
    (encoded.slice(n..), seq)
}

/// Buffers pending puts/deletes under one engine, committing them
/// together under a single sequence number.
///
/// Buffering is internally synchronized (a `parking_lot::Mutex` around the
/// pending map) so multiple threads may share one batch; `commit` itself
/// additionally takes the engine's write lock.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<HashMap<Bytes, LogRecord>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: WriteBatchOptions) -> Self {
        Self {
            engine,
            options,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Buffers a put; last writer for a given key wins within the batch.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.pending
            .lock()
            .insert(key.clone(), LogRecord::normal(key, value.into()));
        Ok(())
    }

    /// Buffers a delete. If the key isn't visible in the engine yet (no
    /// committed write has reached it), simply drops any pending entry for
    /// it instead of buffering a tombstone.
    pub fn delete(&self, key: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        if self.engine.keydir.get(&key)?.is_none() {
            self.pending.lock().remove(&key);
            return Ok(());
        }
        self.pending.lock().insert(key.clone(), LogRecord::deleted(key));
        Ok(())
    }

    /// Commits every buffered operation atomically: all of them become
    /// visible together, exactly when the `TXN_FINISHED` terminator is
    /// durable.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_write_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let mut state = self.engine.state.write();
        let seq = self.engine.next_seq();

        let mut positions = HashMap::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let wrapped = LogRecord {
                key: encode_seq_key(seq, key),
                value: record.value.clone(),
                record_type: record.record_type,
            };
            let pos = self.engine.append_locked(&mut state, &wrapped)?;
            positions.insert(key.clone(), pos);
        }

        let finish = LogRecord::txn_finished(encode_seq_key(seq, TXN_FIN_KEY));
        self.engine.append_locked(&mut state, &finish)?;

        if self.options.sync_writes {
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
        }

        for (key, record) in pending.iter() {
            let pos = positions[key];
            match record.record_type {
                LogRecordType::Normal => {
                    let old = self.engine.keydir.put(key.clone(), pos)?;
                    if let Some(old_pos) = old {
                        state.reclaim_size += old_pos.size as u64;
                    }
                }
                LogRecordType::Deleted => {
                    state.reclaim_size += pos.size as u64;
                    let (old, removed) = self.engine.keydir.delete(key)?;
                    if !removed {
                        return Err(Error::IndexUpdateFailed);
                    }
                    if let Some(old_pos) = old {
                        state.reclaim_size += old_pos.size as u64;
                    }
                }
                LogRecordType::TxnFinished => unreachable!("never buffered"),
            }
        }

        pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_key_round_trips() {
        for (seq, key) in [(0u64, &b"a"[..]), (1, b"name"), (u64::MAX, b"")] {
            let encoded = encode_seq_key(seq, key);
            let (raw_key, decoded_seq) = parse_seq_key(&encoded);
            assert_eq!(decoded_seq, seq);
            assert_eq!(raw_key.as_ref(), key);
        }
    }
}
