//! In-memory ordered-tree keydir backend.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{sort_for_iteration, Keydir, KeydirIterator, SortedSnapshotIterator};
use crate::codec::LogRecordPos;
use crate::error::Result;

/// A keydir backed by a `BTreeMap`, giving lexicographic key ordering for
/// free. Guarded by a single `RwLock`, mirroring the reference
/// implementation's `sync.RWMutex`-protected `google/btree`.
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Bytes, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keydir for BTreeIndex {
    fn put(&self, key: Bytes, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.read().get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        let removed = self.tree.write().remove(key);
        let present = removed.is_some();
        Ok((removed, present))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.tree.read().len())
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn KeydirIterator>> {
        let entries: Vec<(Bytes, LogRecordPos)> = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
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

    fn pos(offset: i64) -> LogRecordPos {
        LogRecordPos {
            file_id: 0,
            offset,
            size: 1,
        }
    }

    #[test]
    fn put_get_delete_round_trip() {
        let index = BTreeIndex::new();
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
        let (old, removed) = index.delete(b"a").unwrap();
        assert_eq!(old, None);
        assert!(!removed);
    }

    #[test]
    fn iterates_in_lexicographic_order() {
        let index = BTreeIndex::new();
        for (i, key) in ["b", "a", "c"].iter().enumerate() {
            index
                .put(Bytes::copy_from_slice(key.as_bytes()), pos(i as i64))
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

        let mut it = index.iter(true).unwrap();
        let mut keys = Vec::new();
        it.rewind();
        while it.valid() {
            keys.push(it.key());
            it.next();
        }
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[test]
    fn seek_positions_cursor_at_first_match() {
        let index = BTreeIndex::new();
        for key in ["a", "c", "e"] {
            index
                .put(Bytes::copy_from_slice(key.as_bytes()), pos(0))
                .unwrap();
        }
        let mut it = index.iter(false).unwrap();
        it.seek(b"b");
        assert_eq!(it.key(), "c");

        let mut it = index.iter(true).unwrap();
        it.seek(b"d");
        assert_eq!(it.key(), "c");
    }
}
