//! The keydir: a pluggable mapping from raw key bytes to a [`LogRecordPos`].
//!
//! Three interchangeable implementations are provided, selected at `Open`
//! time via [`IndexType`]: an in-memory ordered tree ([`btree::BTreeIndex`]),
//! an in-memory adaptive radix tree ([`art::AdaptiveRadixTreeIndex`]), and an
//! on-disk B+ tree ([`bptree::BPlusTreeIndex`]). All three implement the same
//! [`Keydir`] trait and expose an ordered [`KeydirIterator`].

mod art;
mod btree;
mod bptree;

use std::path::Path;

use bytes::Bytes;

pub use art::AdaptiveRadixTreeIndex;
pub use btree::BTreeIndex;
pub use bptree::BPlusTreeIndex;

use crate::codec::LogRecordPos;
use crate::error::Result;

/// Which keydir backend an [`crate::Engine`] was (or should be) opened
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory ordered tree (`BTreeMap`), torn down on close.
    OrderedTree,
    /// In-memory adaptive radix tree, torn down on close.
    AdaptiveRadixTree,
    /// On-disk B+ tree (`jammdb`), durable across restarts.
    BPlusTree,
}

/// The mapping from raw key bytes to their most recent [`LogRecordPos`].
///
/// Implementations provide their own internal synchronization; the engine
/// additionally wraps every mutating call in its own read/write lock so
/// readers never observe a keydir update that is not yet matched by a
/// durable log record.
pub trait Keydir: Send + Sync {
    /// Inserts or replaces the position for `key`, returning the position
    /// it previously pointed to, if any.
    fn put(&self, key: Bytes, pos: LogRecordPos) -> Result<Option<LogRecordPos>>;

    /// Looks up the current position of `key`.
    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>>;

    /// Removes `key`. Returns `(previous position, was actually present)`.
    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)>;

    /// Number of live entries.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns an ordered iterator over every `(key, pos)` pair.
    fn iter(&self, reverse: bool) -> Result<Box<dyn KeydirIterator>>;

    /// Flushes any backend-owned persistent state. No-op for in-memory
    /// backends.
    fn close(&self) -> Result<()>;
}

/// An ordered cursor over a keydir's contents, modeled after the reference
/// implementation's `Iterator` interface (`Rewind`/`Seek`/`Next`/`Valid`).
pub trait KeydirIterator {
    /// Moves the cursor to the first (or, if reverse, last) entry.
    fn rewind(&mut self);

    /// Moves the cursor to the first entry whose key is `>= key` (or, if
    /// reverse, the last entry whose key is `<= key`).
    fn seek(&mut self, key: &[u8]);

    /// Advances the cursor by one entry.
    fn next(&mut self);

    /// Whether the cursor currently points at a valid entry.
    fn valid(&self) -> bool;

    /// The key at the cursor. Panics if `!valid()`.
    fn key(&self) -> Bytes;

    /// The position at the cursor. Panics if `!valid()`.
    fn value(&self) -> LogRecordPos;
}

/// A cursor over a pre-sorted snapshot of entries, shared by the two
/// in-memory backends (`BTreeIndex` and `AdaptiveRadixTreeIndex`): both
/// build their ordered iterator the same way the reference implementation
/// does, by draining their tree into a sorted vector once up front.
pub(crate) struct SortedSnapshotIterator {
    entries: Vec<(Bytes, LogRecordPos)>,
    reverse: bool,
    index: usize,
}

impl SortedSnapshotIterator {
    /// `entries` must already be in final iteration order: ascending by key
    /// when `reverse` is `false`, descending when `true` (see
    /// [`sort_for_iteration`]).
    pub(crate) fn new(entries: Vec<(Bytes, LogRecordPos)>, reverse: bool) -> Self {
        Self {
            entries,
            reverse,
            index: 0,
        }
    }
}

impl KeydirIterator for SortedSnapshotIterator {
    fn rewind(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.index = if self.reverse {
            // First entry (from the front) that is `<= key`, scanning in
            // descending order: the partition point where entries switch
            // from `> key` to `<= key`.
            self.entries.partition_point(|(k, _)| k.as_ref() > key)
        } else {
            self.entries.partition_point(|(k, _)| k.as_ref() < key)
        };
    }

    fn next(&mut self) {
        self.index += 1;
    }

    fn valid(&self) -> bool {
        self.index < self.entries.len()
    }

    fn key(&self) -> Bytes {
        self.current().0.clone()
    }

    fn value(&self) -> LogRecordPos {
        self.current().1
    }
}

impl SortedSnapshotIterator {
    fn current(&self) -> &(Bytes, LogRecordPos) {
        &self.entries[self.index]
    }
}

/// Sorts `entries` ascending by key, then reverses if `reverse` is set, so
/// that index `0` is always "rewind position".
pub(crate) fn sort_for_iteration(mut entries: Vec<(Bytes, LogRecordPos)>, reverse: bool) -> Vec<(Bytes, LogRecordPos)> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    if reverse {
        entries.reverse();
    }
    entries
}

/// Constructs the keydir backend selected by `index_type`.
pub fn open<P: AsRef<Path>>(
    index_type: IndexType,
    dir_path: P,
    sync_writes: bool,
) -> Result<Box<dyn Keydir>> {
    match index_type {
        IndexType::OrderedTree => Ok(Box::new(BTreeIndex::new())),
        IndexType::AdaptiveRadixTree => Ok(Box::new(AdaptiveRadixTreeIndex::new())),
        IndexType::BPlusTree => Ok(Box::new(BPlusTreeIndex::open(dir_path, sync_writes)?)),
    }
}
