use std::cmp::{Eq, Ord, Ordering, PartialOrd};
use std::fmt;

/// A half-open byte range `[offset, offset + length)` into either the data
/// file or the index file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryPointer {
    pub offset: u64,
    pub length: u32,
}

impl MemoryPointer {
    pub fn new(offset: u64, length: u32) -> MemoryPointer {
        MemoryPointer { offset, length }
    }

    /// The empty pointer marks a tree without a root.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

impl fmt::Display for MemoryPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.offset, self.end())
    }
}

/// A tree key. `value` holds the parsed key bytes and is what the key compares
/// by; `data_pointer` is where those bytes came from in the data file.
///
/// The data pointer doubles as a tiebreaker, which lets the tree hold the same
/// user-level value many times as distinct entries.
#[derive(Clone, Debug, Default, Eq)]
pub struct ReferencedValue {
    pub data_pointer: MemoryPointer,
    pub value: Vec<u8>,
}

impl ReferencedValue {
    pub fn new(data_pointer: MemoryPointer, value: Vec<u8>) -> ReferencedValue {
        ReferencedValue {
            data_pointer,
            value,
        }
    }

    /// A key with no data pointer; it sorts before every referenced key of
    /// the same value, which makes it a good search probe.
    pub fn unreferenced(value: impl Into<Vec<u8>>) -> ReferencedValue {
        ReferencedValue {
            data_pointer: MemoryPointer::default(),
            value: value.into(),
        }
    }
}

impl Ord for ReferencedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.data_pointer.cmp(&other.data_pointer))
    }
}

impl PartialOrd for ReferencedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReferencedValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.data_pointer == other.data_pointer
    }
}

impl fmt::Display for ReferencedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReferencedValue@{}{{{}}}",
            self.data_pointer,
            String::from_utf8_lossy(&self.value)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pointers_order_by_offset_then_length() {
        let a = MemoryPointer::new(10, 5);
        let b = MemoryPointer::new(10, 6);
        let c = MemoryPointer::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.end(), 15);
    }

    #[test]
    fn referenced_values_compare_by_value_first() {
        let low = ReferencedValue::new(MemoryPointer::new(100, 1), b"a".to_vec());
        let high = ReferencedValue::new(MemoryPointer::new(0, 1), b"b".to_vec());
        assert!(low < high);
    }

    #[test]
    fn equal_values_break_ties_on_data_pointer() {
        let first = ReferencedValue::new(MemoryPointer::new(0, 3), b"key".to_vec());
        let second = ReferencedValue::new(MemoryPointer::new(17, 3), b"key".to_vec());
        assert!(first < second);
        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }

    #[test]
    fn unreferenced_probe_sorts_before_referenced_duplicates() {
        let probe = ReferencedValue::unreferenced(b"key".to_vec());
        let stored = ReferencedValue::new(MemoryPointer::new(0, 3), b"key".to_vec());
        assert!(probe < stored);
        assert!(probe > ReferencedValue::unreferenced(b"kex".to_vec()));
    }
}
