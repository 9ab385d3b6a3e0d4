//! A persistent secondary index over append-only JSON-lines and CSV files.
//!
//! The index file is a sequence of 4096 byte pages. Page 0 tracks freed
//! pages, page 1 starts a linked chain of meta slots: the first slot holds
//! the file metadata, every other slot owns the B+ tree of one field.

pub mod btree;
pub mod cursor;
pub mod error;
pub mod field_type;
pub mod handler;
pub mod index_file;
pub mod linked_page;
pub mod meta;
pub mod node;
pub mod node_type;
pub mod page;
pub mod page_layout;
pub mod pager;
pub mod pointer;

pub use btree::BPTree;
pub use error::{Error, Result};
pub use field_type::FieldType;
pub use index_file::{Index, IndexFile};
pub use linked_page::{LinkedPage, MetaPage};
pub use meta::{FileMeta, Format, IndexMeta};
pub use pager::PageFile;
pub use pointer::{MemoryPointer, ReferencedValue};

#[cfg(test)]
mod tests {
    // Setup only one time throughout the crate.
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
