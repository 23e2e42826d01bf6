//! On-disk B+ tree keydir backend, backed by `jammdb`.
//!
//! Unlike the two in-memory backends, this index survives a restart on its
//! own: [`crate::engine`]'s recovery path can skip replaying hint/data
//! files entirely for this backend and instead trust the seq-no snapshot
//! (mirroring the reference implementation's B+Tree-specific fast path in
//! `loadSeqNo`/`checkOptions`).

use std::path::Path;

use bytes::Bytes;
use jammdb::DB;

use super::{sort_for_iteration, Keydir, KeydirIterator, SortedSnapshotIterator};
use crate::codec::{decode_log_record_pos, encode_log_record_pos, LogRecordPos};
use crate::error::Result;

const BUCKET_NAME: &[u8] = b"logcask-index";
const INDEX_FILE_NAME: &str = "bptree-index";

pub struct BPlusTreeIndex {
    db: DB,
}

impl BPlusTreeIndex {
    /// Opens (creating if absent) the `bptree-index` file under `dir_path`
    /// and ensures the index bucket exists.
    pub fn open<P: AsRef<Path>>(dir_path: P, _sync_writes: bool) -> Result<Self> {
        let path = dir_path.as_ref().join(INDEX_FILE_NAME);
        let db = DB::open(path)?;
        let tx = db.tx(true)?;
        tx.get_or_create_bucket(BUCKET_NAME)?;
        tx.commit()?;
        Ok(Self { db })
    }
}

impl Keydir for BPlusTreeIndex {
    fn put(&self, key: Bytes, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        let tx = self.db.tx(true)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let old = bucket
            .get(key.as_ref())
            .map(|data| decode_log_record_pos(data.kv().value()));
        bucket.put(key.to_vec(), encode_log_record_pos(pos))?;
        tx.commit()?;
        Ok(old)
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        Ok(bucket
            .get(key)
            .map(|data| decode_log_record_pos(data.kv().value())))
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        let tx = self.db.tx(true)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let old = bucket
            .get(key)
            .map(|data| decode_log_record_pos(data.kv().value()));
        let present = old.is_some();
        if present {
            bucket.delete(key)?;
        }
        tx.commit()?;
        Ok((old, present))
    }

    fn len(&self) -> Result<usize> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        Ok(bucket.cursor().count())
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn KeydirIterator>> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let entries: Vec<(Bytes, LogRecordPos)> = bucket
            .cursor()
            .map(|data| {
                let kv = data.kv();
                (
                    Bytes::copy_from_slice(kv.key()),
                    decode_log_record_pos(kv.value()),
                )
            })
            .collect();
        Ok(Box::new(SortedSnapshotIterator::new(
            sort_for_iteration(entries, reverse),
            reverse,
        )))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pos(offset: i64) -> LogRecordPos {
        LogRecordPos {
            file_id: 0,
            offset,
            size: 1,
        }
    }

    #[test]
    fn put_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let index = BPlusTreeIndex::open(dir.path(), true).unwrap();
        assert_eq!(index.put(Bytes::from_static(b"a"), pos(1)).unwrap(), None);
        assert_eq!(index.get(b"a").unwrap(), Some(pos(1)));
        assert_eq!(
            index.put(Bytes::from_static(b"a"), pos(2)).unwrap(),
            Some(pos(1))
        );
        let (old, removed) = index.delete(b"a").unwrap();
        assert_eq!(old, Some(pos(2)));
        assert!(removed);
        assert_eq!(index.get(b"a").unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let index = BPlusTreeIndex::open(dir.path(), true).unwrap();
            index.put(Bytes::from_static(b"k"), pos(9)).unwrap();
        }
        let index = BPlusTreeIndex::open(dir.path(), true).unwrap();
        assert_eq!(index.get(b"k").unwrap(), Some(pos(9)));
    }

    #[test]
    fn iterates_in_lexicographic_order() {
        let dir = tempdir().unwrap();
        let index = BPlusTreeIndex::open(dir.path(), true).unwrap();
        for key in ["b", "a", "c"] {
            index
                .put(Bytes::copy_from_slice(key.as_bytes()), pos(0))
                .unwrap();
        }
        let mut it = index.iter(false).unwrap();
        let mut keys = Vec::new();
        it.rewind();
        while it.valid() {
            keys.push(it.key());
            it.next();
        }
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
