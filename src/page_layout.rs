use std::mem::size_of;

/// A single page size.
/// Every structure in the index file lives inside one page.
pub const PAGE_SIZE: usize = 4096;

pub const PTR_SIZE: usize = size_of::<u64>();
pub const LENGTH_SIZE: usize = size_of::<u32>();

/// A memory pointer is serialized as a u64 offset followed by a u32 length.
pub const MEMORY_POINTER_SIZE: usize = PTR_SIZE + LENGTH_SIZE;

/// Free page index layout (page 0).
///
/// Up to 512 little-endian u64 page offsets, terminated by the first zero.
/// A real page never sits at offset zero, so zero safely marks the end.
pub const MAX_FREE_PAGE_INDEXES: usize = PAGE_SIZE / PTR_SIZE;

/// Meta page header layout (Nine bytes in total)
pub const NEXT_PAGE_OFFSET: usize = 0;
pub const NEXT_PAGE_SIZE: usize = PTR_SIZE;
pub const SLOT_COUNT_OFFSET: usize = NEXT_PAGE_OFFSET + NEXT_PAGE_SIZE;
pub const SLOT_COUNT_SIZE: usize = 1;
pub const META_PAGE_HEADER_SIZE: usize = NEXT_PAGE_SIZE + SLOT_COUNT_SIZE;

/// The next pointer of the last meta page.
pub const NO_NEXT_PAGE: u64 = u64::MAX;

/// Meta slot layout (269 bytes in total)
///
/// +0   u64 root offset
/// +8   u32 root length
/// +12  u8  metadata length
/// +13  256 bytes of metadata, of which at most 255 are used.
pub const SLOT_ROOT_OFFSET: usize = 0;
pub const SLOT_METADATA_LENGTH_OFFSET: usize = SLOT_ROOT_OFFSET + MEMORY_POINTER_SIZE;
pub const SLOT_METADATA_OFFSET: usize = SLOT_METADATA_LENGTH_OFFSET + 1;
pub const SLOT_METADATA_CAPACITY: usize = 256;
pub const MAX_METADATA_SIZE: usize = u8::MAX as usize;
pub const SLOT_SIZE: usize = SLOT_METADATA_OFFSET + SLOT_METADATA_CAPACITY;

/// 9 + 15 * 269 = 4044 bytes, the remaining 52 are slack.
pub const SLOTS_PER_PAGE: u8 = ((PAGE_SIZE - META_PAGE_HEADER_SIZE) / SLOT_SIZE) as u8;

/// Node header layout: a signed key count, negative for leaves.
pub const NODE_HEADER_SIZE: usize = size_of::<i32>();

/// Boolean keys are stored as one byte: one is true, zero is false.
pub trait ToByte {
    fn to_byte(&self) -> u8;
}

impl ToByte for bool {
    fn to_byte(&self) -> u8 {
        match self {
            true => 0x01,
            false => 0x00,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_geometry() {
        assert_eq!(SLOT_SIZE, 269);
        assert_eq!(SLOTS_PER_PAGE, 15);
        assert!(META_PAGE_HEADER_SIZE + SLOTS_PER_PAGE as usize * SLOT_SIZE <= PAGE_SIZE);
        assert_eq!(MAX_FREE_PAGE_INDEXES, 512);
    }

    #[test]
    fn bool_bytes() {
        assert_eq!(true.to_byte(), 1);
        assert_eq!(false.to_byte(), 0);
    }
}
