use crate::cursor::{TraversalIterator, TraversalRecord};
use crate::error::Error;
use crate::linked_page::MetaPage;
use crate::node::{BPTreeNode, DataParser};
use crate::node_type::NodeType;
use crate::page::Page;
use crate::page_layout::PAGE_SIZE;
use crate::pager::PageFile;
use crate::pointer::{MemoryPointer, ReferencedValue};
use std::fmt::Write as _;
use std::io::{Read, Seek, SeekFrom, Write};

/// A B+ tree whose nodes each occupy one page of `page_file` and whose root
/// pointer lives in `meta_page`.
///
/// Nodes hold as many keys as fit in a page; there is no fixed branching
/// factor. Keys of variable width fields are stored by reference and resolved
/// through `data` and `parser` whenever a node is read.
pub struct BPTree<'a, T, M> {
    page_file: &'a mut PageFile<T>,
    meta_page: M,
    data: &'a [u8],
    parser: &'a dyn DataParser,
    width: u16,
}

impl<'a, T, M> BPTree<'a, T, M>
where
    T: Read + Write + Seek,
    M: MetaPage<T>,
{
    pub fn new(
        page_file: &'a mut PageFile<T>,
        meta_page: M,
        data: &'a [u8],
        parser: &'a dyn DataParser,
        width: u16,
    ) -> BPTree<'a, T, M> {
        BPTree {
            page_file,
            meta_page,
            data,
            parser,
            width,
        }
    }

    fn root(&mut self) -> Result<Option<(BPTreeNode, MemoryPointer)>, Error> {
        let root = self.meta_page.root(self.page_file)?;
        if root.is_empty() {
            return Ok(None);
        }
        let node = self.read_node(root.offset)?;
        Ok(Some((node, root)))
    }

    pub(crate) fn read_node(&mut self, offset: u64) -> Result<BPTreeNode, Error> {
        self.page_file.seek(SeekFrom::Start(offset))?;
        let page = Page::read_from(self.page_file)?;
        BPTreeNode::unmarshal(page.get_bytes(), self.width, self.data, self.parser)
    }

    fn write_node(&mut self, offset: u64, node: &BPTreeNode) -> Result<(), Error> {
        let page = Page::from_prefix(&node.marshal()?)?;
        self.page_file.seek(SeekFrom::Start(offset))?;
        page.write_to(self.page_file)
    }

    fn write_new_node(&mut self, node: &BPTreeNode) -> Result<u64, Error> {
        let buf = node.marshal()?;
        self.page_file.new_page(Some(&buf))
    }

    fn set_root(&mut self, offset: u64) -> Result<(), Error> {
        self.meta_page
            .set_root(self.page_file, MemoryPointer::new(offset, PAGE_SIZE as u32))
    }

    // traverse returns the path from root to leaf in reverse order (leaf first).
    // A key equal to a separator continues into the right child.
    fn traverse(
        &mut self,
        key: &ReferencedValue,
        root: BPTreeNode,
        root_offset: u64,
    ) -> Result<Vec<TraversalRecord>, Error> {
        let mut path = Vec::new();
        let mut node = root;
        let mut offset = root_offset;
        loop {
            let index = match node.keys.binary_search(key) {
                Ok(i) if !node.leaf() => i + 1,
                Ok(i) | Err(i) => i,
            };
            if node.leaf() {
                path.push(TraversalRecord {
                    node,
                    index,
                    offset,
                });
                break;
            }
            let child = node.pointer(index).offset;
            path.push(TraversalRecord {
                node,
                index,
                offset,
            });
            node = self.read_node(child)?;
            offset = child;
        }
        path.reverse();
        Ok(path)
    }

    pub(crate) fn traverse_from_root(
        &mut self,
        key: &ReferencedValue,
    ) -> Result<Option<Vec<TraversalRecord>>, Error> {
        match self.root()? {
            Some((root, pointer)) => Ok(Some(self.traverse(key, root, pointer.offset)?)),
            None => Ok(None),
        }
    }

    /// Inserts `key`, pointing at `value` in the data file.
    pub fn insert(&mut self, key: ReferencedValue, value: MemoryPointer) -> Result<(), Error> {
        if self.width > 0 && key.value.len() != (self.width - 1) as usize {
            return Err(Error::WidthMismatch {
                expected: (self.width - 1) as usize,
                actual: key.value.len(),
            });
        }

        let (root, root_pointer) = match self.root()? {
            Some(root) => root,
            None => {
                // special case, the first key becomes a root leaf
                let node = BPTreeNode::new_leaf(self.width, vec![key], vec![value]);
                let offset = self.write_new_node(&node)?;
                return self.set_root(offset);
            }
        };

        let mut path = self.traverse(&key, root, root_pointer.offset)?;

        let leaf = &mut path[0].node;
        let j = match leaf.keys.binary_search(&key) {
            Ok(_) => return Err(Error::DuplicateKey(key.data_pointer)),
            Err(j) => j,
        };
        match &mut leaf.pointers {
            NodeType::Leaf(pointers) => pointers.insert(j, value),
            NodeType::Internal(_) => {
                return Err(Error::Corrupt("traversal ended on an internal node".to_string()))
            }
        }
        leaf.keys.insert(j, key);

        // walk back up, splitting while nodes overflow their page
        for i in 0..path.len() {
            if path[i].node.size() <= PAGE_SIZE {
                let offset = path[i].offset;
                return self.write_node(offset, &path[i].node);
            }

            let (mid_key, right) = path[i].node.split();
            let right_offset = self.write_new_node(&right)?;
            let left_offset = path[i].offset;
            self.write_node(left_offset, &path[i].node)?;
            log::debug!(
                "split node at {} into {} and {}",
                left_offset,
                left_offset,
                right_offset
            );

            match path.get_mut(i + 1) {
                Some(parent) => {
                    // the parent is written on the next iteration
                    let p = parent.index;
                    parent.node.keys.insert(p, mid_key);
                    match &mut parent.node.pointers {
                        NodeType::Internal(children) => children.insert(p + 1, right_offset),
                        NodeType::Leaf(_) => {
                            return Err(Error::Corrupt("leaf node above a split".to_string()))
                        }
                    }
                }
                None => {
                    // the root split, so grow a new root
                    let root = BPTreeNode::new_internal(
                        self.width,
                        vec![mid_key],
                        vec![left_offset, right_offset],
                    );
                    let offset = self.write_new_node(&root)?;
                    return self.set_root(offset);
                }
            }
        }
        Ok(())
    }

    /// A cursor positioned at `key`.
    pub fn iter(&mut self, key: ReferencedValue) -> TraversalIterator<'_, 'a, T, M> {
        TraversalIterator::new(self, key)
    }

    /// The first entry `>= key`, and whether its value equals `key`'s value.
    pub fn find(
        &mut self,
        key: &ReferencedValue,
    ) -> Result<(ReferencedValue, MemoryPointer, bool), Error> {
        match self.iter(key.clone()).next_entry()? {
            Some((found, pointer)) => {
                let matched = found.value == key.value;
                Ok((found, pointer, matched))
            }
            None => Ok((ReferencedValue::default(), MemoryPointer::default(), false)),
        }
    }

    pub fn contains(&mut self, key: &ReferencedValue) -> Result<bool, Error> {
        let (_, _, found) = self.find(key)?;
        Ok(found)
    }

    pub fn first(&mut self) -> Result<Option<(ReferencedValue, MemoryPointer)>, Error> {
        self.edge(false)
    }

    pub fn last(&mut self) -> Result<Option<(ReferencedValue, MemoryPointer)>, Error> {
        self.edge(true)
    }

    fn edge(&mut self, rightmost: bool) -> Result<Option<(ReferencedValue, MemoryPointer)>, Error> {
        let mut node = match self.root()? {
            Some((root, _)) => root,
            None => return Ok(None),
        };
        while !node.leaf() {
            let i = if rightmost { node.num_pointers() - 1 } else { 0 };
            node = self.read_node(node.pointer(i).offset)?;
        }
        let i = if rightmost { node.keys.len() - 1 } else { 0 };
        Ok(node.keys.get(i).map(|key| (key.clone(), node.pointer(i))))
    }

    /// Number of levels, counting the leaves. Zero for an empty tree.
    pub fn depth(&mut self) -> Result<usize, Error> {
        let mut node = match self.root()? {
            Some((root, _)) => root,
            None => return Ok(0),
        };
        let mut depth = 1;
        while !node.leaf() {
            node = self.read_node(node.pointer(0).offset)?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Renders every node of the tree, one key per line, children indented.
    pub fn dump(&mut self) -> Result<String, Error> {
        match self.root()? {
            Some((root, _)) => {
                let mut buf = String::from("b+ tree ---\n");
                self.dump_node(&root, 0, &mut buf)?;
                Ok(buf)
            }
            None => Ok("empty tree".to_string()),
        }
    }

    fn dump_node(&mut self, node: &BPTreeNode, indent: usize, buf: &mut String) -> Result<(), Error> {
        let pad = "  ".repeat(indent);
        match &node.pointers {
            NodeType::Leaf(_) => {
                for key in &node.keys {
                    let _ = writeln!(buf, "{}{}", pad, key);
                }
            }
            NodeType::Internal(children) => {
                for (i, child) in children.iter().enumerate() {
                    let child = self.read_node(*child)?;
                    self.dump_node(&child, indent + 1, buf)?;
                    if let Some(key) = node.keys.get(i) {
                        let _ = writeln!(buf, "{}key {}", pad, key);
                    }
                }
            }
        }
        Ok(())
    }
}
