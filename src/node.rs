use crate::error::Error;
use crate::node_type::NodeType;
use crate::page_layout::{MEMORY_POINTER_SIZE, NODE_HEADER_SIZE, PTR_SIZE};
use crate::pointer::{MemoryPointer, ReferencedValue};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Turns the raw bytes a key's data pointer addresses into comparable key bytes.
pub trait DataParser {
    fn parse(&self, raw: &[u8]) -> Result<Vec<u8>, Error>;
}

/// A B+ tree node as it lives in one page.
///
/// Page layout:
///
/// +0  i32 signed key count, negative for leaves
/// for each key:   u64 data offset | u32 data length | width - 1 inline bytes (fixed width only)
/// for each key:   u64 offset | u32 length              (leaf)
/// for each key+1: u64 child page offset                (internal)
///
/// Variable width keys (width 0) only store their data pointer; the value is
/// parsed back out of the data file when the node is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BPTreeNode {
    pub keys: Vec<ReferencedValue>,
    pub pointers: NodeType,
    width: u16,
}

impl BPTreeNode {
    pub fn new_leaf(
        width: u16,
        keys: Vec<ReferencedValue>,
        pointers: Vec<MemoryPointer>,
    ) -> BPTreeNode {
        BPTreeNode {
            keys,
            pointers: NodeType::Leaf(pointers),
            width,
        }
    }

    pub fn new_internal(width: u16, keys: Vec<ReferencedValue>, children: Vec<u64>) -> BPTreeNode {
        BPTreeNode {
            keys,
            pointers: NodeType::Internal(children),
            width,
        }
    }

    pub fn leaf(&self) -> bool {
        self.pointers.is_leaf()
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    pub fn pointer(&self, i: usize) -> MemoryPointer {
        self.pointers.pointer(i)
    }

    fn key_size(&self) -> usize {
        MEMORY_POINTER_SIZE + self.width.saturating_sub(1) as usize
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        let pointers = match &self.pointers {
            NodeType::Internal(children) => children.len() * PTR_SIZE,
            NodeType::Leaf(pointers) => pointers.len() * MEMORY_POINTER_SIZE,
        };
        NODE_HEADER_SIZE + self.keys.len() * self.key_size() + pointers
    }

    pub fn marshal(&self) -> Result<Vec<u8>, Error> {
        if self.keys.is_empty() {
            return Err(Error::Corrupt("refusing to write an empty node".to_string()));
        }
        let count = i32::try_from(self.keys.len())
            .map_err(|_| Error::Corrupt(format!("{} keys overflow a node", self.keys.len())))?;

        let mut buf = Vec::with_capacity(self.size());
        if self.leaf() {
            buf.write_i32::<LittleEndian>(-count)?;
        } else {
            buf.write_i32::<LittleEndian>(count)?;
        }

        for key in &self.keys {
            buf.write_u64::<LittleEndian>(key.data_pointer.offset)?;
            buf.write_u32::<LittleEndian>(key.data_pointer.length)?;
            if self.width > 0 {
                let expected = (self.width - 1) as usize;
                if key.value.len() != expected {
                    return Err(Error::WidthMismatch {
                        expected,
                        actual: key.value.len(),
                    });
                }
                buf.extend_from_slice(&key.value);
            }
        }

        match &self.pointers {
            NodeType::Leaf(pointers) => {
                for p in pointers {
                    buf.write_u64::<LittleEndian>(p.offset)?;
                    buf.write_u32::<LittleEndian>(p.length)?;
                }
            }
            NodeType::Internal(children) => {
                for child in children {
                    buf.write_u64::<LittleEndian>(*child)?;
                }
            }
        }
        debug_assert_eq!(buf.len(), self.size());
        Ok(buf)
    }

    /// Decodes a node. `data` and `parser` resolve variable width keys.
    pub fn unmarshal(
        buf: &[u8],
        width: u16,
        data: &[u8],
        parser: &dyn DataParser,
    ) -> Result<BPTreeNode, Error> {
        let mut r = Cursor::new(buf);
        let count = r.read_i32::<LittleEndian>()?;
        if count == 0 {
            return Err(Error::Corrupt("node has no keys".to_string()));
        }

        let mut node = BPTreeNode {
            keys: Vec::new(),
            pointers: NodeType::from(count),
            width,
        };
        let n = count.unsigned_abs() as usize;
        let pointer_count = if node.leaf() { n } else { n + 1 };
        let pointer_size = if node.leaf() { MEMORY_POINTER_SIZE } else { PTR_SIZE };
        if NODE_HEADER_SIZE + n * node.key_size() + pointer_count * pointer_size > buf.len() {
            return Err(Error::Corrupt(format!(
                "node with {} keys does not fit in {} bytes",
                n,
                buf.len()
            )));
        }

        node.keys.reserve(n);
        match &mut node.pointers {
            NodeType::Leaf(pointers) => pointers.reserve(pointer_count),
            NodeType::Internal(children) => children.reserve(pointer_count),
        }
        for _ in 0..n {
            let offset = r.read_u64::<LittleEndian>()?;
            let length = r.read_u32::<LittleEndian>()?;
            let data_pointer = MemoryPointer::new(offset, length);
            let value = if width == 0 {
                parser.parse(referenced_bytes(data, data_pointer)?)?
            } else {
                let mut value = vec![0u8; (width - 1) as usize];
                std::io::Read::read_exact(&mut r, &mut value)?;
                value
            };
            node.keys.push(ReferencedValue::new(data_pointer, value));
        }

        match &mut node.pointers {
            NodeType::Leaf(pointers) => {
                for _ in 0..n {
                    let offset = r.read_u64::<LittleEndian>()?;
                    let length = r.read_u32::<LittleEndian>()?;
                    pointers.push(MemoryPointer::new(offset, length));
                }
            }
            NodeType::Internal(children) => {
                for _ in 0..=n {
                    children.push(r.read_u64::<LittleEndian>()?);
                }
            }
        }
        Ok(node)
    }

    /// Splits an overflowing node in half. `self` keeps the left half; the
    /// right half and the key to promote into the parent are returned.
    ///
    /// Leaves copy their middle key up. Internal nodes move it up, so it
    /// appears in neither half.
    pub fn split(&mut self) -> (ReferencedValue, BPTreeNode) {
        let mid = self.keys.len() / 2;
        match &mut self.pointers {
            NodeType::Leaf(pointers) => {
                let right_keys = self.keys.split_off(mid);
                let right_pointers = pointers.split_off(mid);
                let mid_key = right_keys[0].clone();
                (
                    mid_key,
                    BPTreeNode::new_leaf(self.width, right_keys, right_pointers),
                )
            }
            NodeType::Internal(children) => {
                let right_keys = self.keys.split_off(mid + 1);
                let right_children = children.split_off(mid + 1);
                let mid_key = self.keys.remove(mid);
                (
                    mid_key,
                    BPTreeNode::new_internal(self.width, right_keys, right_children),
                )
            }
        }
    }
}

/// The slice of `data` a key points at.
pub fn referenced_bytes(data: &[u8], pointer: MemoryPointer) -> Result<&[u8], Error> {
    usize::try_from(pointer.offset)
        .ok()
        .and_then(|start| data.get(start..start.checked_add(pointer.length as usize)?))
        .ok_or_else(|| {
            Error::Corrupt(format!(
                "key {} points outside of the {} byte data file",
                pointer,
                data.len()
            ))
        })
}
