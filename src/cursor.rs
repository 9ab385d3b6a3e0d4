use crate::btree::BPTree;
use crate::error::Error;
use crate::linked_page::MetaPage;
use crate::node::BPTreeNode;
use crate::pointer::{MemoryPointer, ReferencedValue};
use std::io::{Read, Seek, Write};

/// One step of a root to leaf walk: a snapshot of the node, the position
/// taken within it and the page it was read from.
#[derive(Clone, Debug)]
pub struct TraversalRecord {
    pub node: BPTreeNode,
    pub index: usize,
    pub offset: u64,
}

/// A cursor over the leaves of a tree, positioned by a search key.
///
/// The first `next_entry` yields the smallest entry `>= key`; the first
/// `prev_entry` yields the largest entry `< key`. After that both move one
/// entry at a time in either direction. Stepping past either end returns
/// `None` and leaves the cursor on the last entry it reported.
pub struct TraversalIterator<'t, 'a, T, M> {
    tree: &'t mut BPTree<'a, T, M>,
    key: ReferencedValue,
    // leaf first, root last.
    records: Option<Vec<TraversalRecord>>,
}

impl<'t, 'a, T, M> TraversalIterator<'t, 'a, T, M>
where
    T: Read + Write + Seek,
    M: MetaPage<T>,
{
    pub(crate) fn new(tree: &'t mut BPTree<'a, T, M>, key: ReferencedValue) -> Self {
        TraversalIterator {
            tree,
            key,
            records: None,
        }
    }

    /// Walks down to the search key. Returns false on an empty tree.
    fn init(&mut self) -> Result<bool, Error> {
        match self.tree.traverse_from_root(&self.key)? {
            Some(path) => {
                self.records = Some(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<(ReferencedValue, MemoryPointer)> {
        let leaf = self.records.as_ref()?.first()?;
        let key = leaf.node.keys.get(leaf.index)?;
        Some((key.clone(), leaf.node.pointer(leaf.index)))
    }

    /// Moves the record at `level` one position, rolling over into the
    /// neighbouring subtree through the parent when it runs off the node.
    fn step(&mut self, level: usize, forward: bool) -> Result<bool, Error> {
        let records = match self.records.as_mut() {
            Some(records) => records,
            None => return Ok(false),
        };
        if level == records.len() {
            // can't move beyond the root
            return Ok(false);
        }

        let record = &mut records[level];
        let n = record.node.num_pointers();
        if forward && record.index + 1 < n {
            record.index += 1;
            return Ok(true);
        }
        if !forward && record.index > 0 {
            record.index -= 1;
            return Ok(true);
        }

        if !self.step(level + 1, forward)? {
            return Ok(false);
        }

        let child = match self.records.as_ref().and_then(|r| r.get(level + 1)) {
            Some(parent) => parent.node.pointer(parent.index).offset,
            None => return Ok(false),
        };
        let node = self.tree.read_node(child)?;
        let index = if forward { 0 } else { node.num_pointers() - 1 };
        if let Some(records) = self.records.as_mut() {
            records[level] = TraversalRecord {
                node,
                index,
                offset: child,
            };
        }
        Ok(true)
    }

    pub fn next_entry(&mut self) -> Result<Option<(ReferencedValue, MemoryPointer)>, Error> {
        if self.records.is_none() {
            if !self.init()? {
                return Ok(None);
            }
            if let Some(entry) = self.current() {
                return Ok(Some(entry));
            }
            // the search key sorts after every key in its leaf
        }
        if self.step(0, true)? {
            Ok(self.current())
        } else {
            Ok(None)
        }
    }

    pub fn prev_entry(&mut self) -> Result<Option<(ReferencedValue, MemoryPointer)>, Error> {
        if self.records.is_none() && !self.init()? {
            return Ok(None);
        }
        if self.step(0, false)? {
            Ok(self.current())
        } else {
            Ok(None)
        }
    }
}

impl<'t, 'a, T, M> Iterator for TraversalIterator<'t, 'a, T, M>
where
    T: Read + Write + Seek,
    M: MetaPage<T>,
{
    type Item = Result<(ReferencedValue, MemoryPointer), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
