use crate::pointer::MemoryPointer;

// NodeType Represents different node types in the BTree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Internal nodes contain one child page offset per key, plus one.
    Internal(Vec<u64>),

    /// Leaf nodes contain one data file pointer per key.
    Leaf(Vec<MemoryPointer>),
}

impl NodeType {
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeType::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match self {
            NodeType::Internal(children) => children.len(),
            NodeType::Leaf(pointers) => pointers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pointer at index `i`. Child offsets are reported with a zero length.
    pub fn pointer(&self, i: usize) -> MemoryPointer {
        match self {
            NodeType::Internal(children) => MemoryPointer::new(children[i], 0),
            NodeType::Leaf(pointers) => pointers[i],
        }
    }
}

// Converts a signed key count to an empty NodeType of the right kind.
// Nothing is allocated here, the count may come from a corrupt page.
impl From<i32> for NodeType {
    fn from(count: i32) -> NodeType {
        if count < 0 {
            NodeType::Leaf(Vec::new())
        } else {
            NodeType::Internal(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_are_leaves() {
        assert!(NodeType::from(-3).is_leaf());
        assert!(!NodeType::from(3).is_leaf());
        assert!(NodeType::from(i32::MIN).is_empty());
        assert!(NodeType::from(i32::MAX).is_empty());
    }

    #[test]
    fn internal_pointers_carry_no_length() {
        let node = NodeType::Internal(vec![4096, 8192]);
        assert_eq!(node.pointer(1), MemoryPointer::new(8192, 0));
        assert_eq!(node.len(), 2);
    }
}
