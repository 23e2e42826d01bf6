//! In-memory adaptive radix tree keydir backend.
//!
//! No crate in the reference stack offers a byte-wise radix tree with the
//! exact ordered-iterator contract ([`super::KeydirIterator`]) this crate's
//! recovery and merge code depends on, so it is implemented directly here:
//! a path-compressed radix trie over raw key bytes. Nodes grow their child
//! list on demand rather than stepping through the four fixed-width node
//! classes (4/16/48/256) a textbook ART uses internally — the externally
//! observable behavior (ordered prefix-compressed lookup) is the same; only
//! the node's own storage layout is simpler.

use bytes::Bytes;
use parking_lot::RwLock;

use super::{sort_for_iteration, Keydir, KeydirIterator, SortedSnapshotIterator};
use crate::codec::LogRecordPos;
use crate::error::Result;

/// One trie node. `prefix` is the edge label leading into this node (the
/// key bytes consumed since the parent); `value` is set when some inserted
/// key ends exactly here. Children are kept sorted by their first byte so
/// an in-order traversal yields keys in ascending lexicographic order.
#[derive(Default)]
struct Node {
    prefix: Vec<u8>,
    value: Option<LogRecordPos>,
    children: Vec<(u8, Box<Node>)>,
}

impl Node {
    fn child_index(&self, byte: u8) -> std::result::Result<usize, usize> {
        self.children.binary_search_by_key(&byte, |(b, _)| *b)
    }

    /// Inserts `key[depth..]` under this node, returning the value it
    /// previously held, if any.
    fn insert(&mut self, key: &[u8], value: LogRecordPos) -> Option<LogRecordPos> {
        let common = common_prefix_len(&self.prefix, key);

        if common < self.prefix.len() {
            // Split: the existing edge only partially matches; carve out a
            // child holding the unmatched tail of the old prefix.
            let mut sibling = Box::new(Node {
                prefix: self.prefix[common..].to_vec(),
                value: self.value.take(),
                children: std::mem::take(&mut self.children),
            });
            let sibling_byte = sibling.prefix.remove(0);
            self.prefix.truncate(common);
            self.children.push((sibling_byte, sibling));
            self.children.sort_by_key(|(b, _)| *b);
        }

        let rest = &key[common..];
        if rest.is_empty() {
            return self.value.replace(value);
        }

        let byte = rest[0];
        match self.child_index(byte) {
            Ok(i) => self.children[i].1.insert(rest, value),
            Err(i) => {
                self.children.insert(
                    i,
                    (
                        byte,
                        Box::new(Node {
                            prefix: rest.to_vec(),
                            value: Some(value),
                            children: Vec::new(),
                        }),
                    ),
                );
                None
            }
        }
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        if key.len() < self.prefix.len() || &key[..self.prefix.len()] != self.prefix.as_slice() {
            return None;
        }
        let rest = &key[self.prefix.len()..];
        if rest.is_empty() {
            return self.value;
        }
        let i = self.child_index(rest[0]).ok()?;
        self.children[i].1.get(rest)
    }

    /// Removes `key`, returning `(previous value, child is now empty and
    /// can be pruned from its parent)`.
    fn remove(&mut self, key: &[u8]) -> (Option<LogRecordPos>, bool) {
        if key.len() < self.prefix.len() || &key[..self.prefix.len()] != self.prefix.as_slice() {
            return (None, false);
        }
        let rest = &key[self.prefix.len()..];
        if rest.is_empty() {
            let old = self.value.take();
            let prunable = self.value.is_none() && self.children.is_empty();
            return (old, prunable);
        }
        let Ok(i) = self.child_index(rest[0]) else {
            return (None, false);
        };
        let (old, child_empty) = self.children[i].1.remove(rest);
        if child_empty {
            self.children.remove(i);
        }
        let prunable = self.value.is_none() && self.children.is_empty();
        (old, prunable)
    }

    fn len(&self) -> usize {
        self.value.is_some() as usize + self.children.iter().map(|(_, c)| c.len()).sum::<usize>()
    }

    /// Appends every `(key, pos)` pair reachable from this node to `out`,
    /// in ascending order, with `prefix` the accumulated key bytes leading
    /// into this node.
    fn collect(&self, prefix: &mut Vec<u8>, out: &mut Vec<(Bytes, LogRecordPos)>) {
        prefix.extend_from_slice(&self.prefix);
        if let Some(pos) = self.value {
            out.push((Bytes::copy_from_slice(prefix), pos));
        }
        for (byte, child) in &self.children {
            prefix.push(*byte);
            child.collect(prefix, out);
            prefix.pop();
        }
        prefix.truncate(prefix.len() - self.prefix.len());
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// A keydir backed by a hand-written, path-compressed radix trie over raw
/// key bytes.
pub struct AdaptiveRadixTreeIndex {
    root: RwLock<Node>,
}

impl AdaptiveRadixTreeIndex {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::default()),
        }
    }
}

impl Default for AdaptiveRadixTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Keydir for AdaptiveRadixTreeIndex {
    fn put(&self, key: Bytes, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        Ok(self.root.write().insert(&key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        Ok(self.root.read().get(key))
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<LogRecordPos>, bool)> {
        let (old, _) = self.root.write().remove(key);
        let present = old.is_some();
        Ok((old, present))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.root.read().len())
    }

    fn iter(&self, reverse: bool) -> Result<Box<dyn KeydirIterator>> {
        let mut entries = Vec::new();
        self.root.read().collect(&mut Vec::new(), &mut entries);
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
        let index = AdaptiveRadixTreeIndex::new();
        assert_eq!(index.put(Bytes::from_static(b"apple"), pos(1)).unwrap(), None);
        assert_eq!(
            index.put(Bytes::from_static(b"app"), pos(2)).unwrap(),
            None
        );
        assert_eq!(index.get(b"apple").unwrap(), Some(pos(1)));
        assert_eq!(index.get(b"app").unwrap(), Some(pos(2)));
        assert_eq!(index.get(b"appl").unwrap(), None);

        let (old, removed) = index.delete(b"app").unwrap();
        assert_eq!(old, Some(pos(2)));
        assert!(removed);
        assert_eq!(index.get(b"app").unwrap(), None);
        assert_eq!(index.get(b"apple").unwrap(), Some(pos(1)));
    }

    #[test]
    fn handles_shared_and_divergent_prefixes() {
        let index = AdaptiveRadixTreeIndex::new();
        for (key, off) in [("car", 1), ("cart", 2), ("carton", 3), ("dog", 4)] {
            index
                .put(Bytes::copy_from_slice(key.as_bytes()), pos(off))
                .unwrap();
        }
        assert_eq!(index.len().unwrap(), 4);
        for (key, off) in [("car", 1), ("cart", 2), ("carton", 3), ("dog", 4)] {
            assert_eq!(index.get(key.as_bytes()).unwrap(), Some(pos(off)));
        }
    }

    #[test]
    fn iterates_in_lexicographic_order() {
        let index = AdaptiveRadixTreeIndex::new();
        for key in ["banana", "apple", "cherry", "app"] {
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
        assert_eq!(keys, vec!["app", "apple", "banana", "cherry"]);

        let mut it = index.iter(true).unwrap();
        let mut keys = Vec::new();
        it.rewind();
        while it.valid() {
            keys.push(it.key());
            it.next();
        }
        assert_eq!(keys, vec!["cherry", "banana", "apple", "app"]);
    }
}
