use crate::pointer::MemoryPointer;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing store is not a whole number of pages or page 0 is unreadable.
    #[error("page file is corrupt: {0}")]
    PageFileCorrupt(String),

    #[error("offset {0} is not a multiple of the page size")]
    PageMisaligned(u64),

    #[error("free page index is full")]
    RingFull,

    #[error("page at offset {0} is already free")]
    AlreadyFree(u64),

    #[error("metadata of {0} bytes does not fit in a slot")]
    MetadataTooLarge(usize),

    #[error("next slot already exists")]
    AlreadyExists,

    /// Root or metadata access through the list head, which is not a slot.
    #[error("this is not a slot, call next() on the list head first")]
    NotASlot,

    #[error("key already exists, data pointer {0}")]
    DuplicateKey(MemoryPointer),

    #[error("key of {actual} bytes does not match the field width, expected {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("failed to parse record at offset {offset}: {reason}")]
    ParseError { offset: u64, reason: String },

    #[error("unsupported index file version {0}")]
    VersionUnsupported(u8),

    #[error("index was built for {found:?} data, not {expected:?}")]
    FormatMismatch {
        expected: crate::meta::Format,
        found: crate::meta::Format,
    },

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

impl Error {
    pub(crate) fn parse(offset: u64, reason: impl Into<String>) -> Error {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }
}
