use crate::error::Error;
use crate::page::Page;
use crate::page_layout::{
    MAX_METADATA_SIZE, META_PAGE_HEADER_SIZE, NEXT_PAGE_OFFSET, NO_NEXT_PAGE,
    SLOT_COUNT_OFFSET, SLOT_METADATA_LENGTH_OFFSET, SLOT_ROOT_OFFSET, SLOT_SIZE, SLOTS_PER_PAGE,
};
use crate::pager::PageFile;
use crate::pointer::MemoryPointer;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

/// Anything that can hold the root pointer of a B+ tree.
pub trait MetaPage<T> {
    fn root(&self, page_file: &mut PageFile<T>) -> Result<MemoryPointer, Error>;
    fn set_root(&mut self, page_file: &mut PageFile<T>, root: MemoryPointer)
        -> Result<(), Error>;
}

/// A handle on one slot of the meta page chain.
///
/// Every meta page starts with a header (next page offset, slot count)
/// followed by up to 15 slots of 269 bytes. A slot owns the root pointer of
/// one tree and an opaque metadata blob of at most 255 bytes. The last page
/// of the chain has a next offset of all ones.
///
/// The handle returned by `open` is the list head: it addresses a page but
/// no slot, so `next()` has to be called before reading a root or metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkedPage {
    offset: u64,
    index: Option<u8>,
}

impl LinkedPage {
    /// Opens the chain rooted at the first allocated page, creating it on an
    /// empty page file.
    pub fn open<T: Read + Write + Seek>(page_file: &mut PageFile<T>) -> Result<LinkedPage, Error> {
        let head = LinkedPage {
            offset: page_file.page(0),
            index: None,
        };
        if page_file.page_count() == 0 {
            let offset = page_file.new_page(None)?;
            debug_assert_eq!(offset, head.offset);
            head.reset(page_file, 0)?;
        }
        Ok(head)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Slot index within the page, `None` for the list head.
    pub fn index(&self) -> Option<u8> {
        self.index
    }

    fn next_index(&self) -> u8 {
        self.index.map_or(0, |i| i + 1)
    }

    /// Byte offset of this slot in the index file.
    fn slot_offset(&self) -> Result<u64, Error> {
        let index = self.index.ok_or(Error::NotASlot)?;
        Ok(self.offset + META_PAGE_HEADER_SIZE as u64 + u64::from(index) * SLOT_SIZE as u64)
    }

    fn count<T: Read + Seek>(&self, page_file: &mut PageFile<T>) -> Result<u8, Error> {
        page_file.seek(SeekFrom::Start(self.offset + SLOT_COUNT_OFFSET as u64))?;
        Ok(page_file.read_u8()?)
    }

    fn next_page_offset<T: Read + Seek>(&self, page_file: &mut PageFile<T>) -> Result<u64, Error> {
        page_file.seek(SeekFrom::Start(self.offset + NEXT_PAGE_OFFSET as u64))?;
        Ok(page_file.read_u64::<LittleEndian>()?)
    }

    /// Overwrites the whole page with an empty header holding `count` slots.
    fn reset<T: Write + Seek>(&self, page_file: &mut PageFile<T>, count: u8) -> Result<(), Error> {
        let mut header = [0u8; META_PAGE_HEADER_SIZE];
        LittleEndian::write_u64(&mut header[NEXT_PAGE_OFFSET..SLOT_COUNT_OFFSET], NO_NEXT_PAGE);
        header[SLOT_COUNT_OFFSET] = count;
        page_file.seek(SeekFrom::Start(self.offset))?;
        Page::from_prefix(&header)?.write_to(page_file)
    }

    /// The following slot, or `None` at the end of the chain.
    pub fn next<T: Read + Write + Seek>(
        &self,
        page_file: &mut PageFile<T>,
    ) -> Result<Option<LinkedPage>, Error> {
        let count = self.count(page_file)?;
        if self.next_index() < count {
            return Ok(Some(LinkedPage {
                offset: self.offset,
                index: Some(self.next_index()),
            }));
        }
        let next = self.next_page_offset(page_file)?;
        if next == NO_NEXT_PAGE {
            return Ok(None);
        }
        Ok(Some(LinkedPage {
            offset: next,
            index: Some(0),
        }))
    }

    /// Appends a slot after this one. Only the last slot of the chain may grow it.
    pub fn add_next<T: Read + Write + Seek>(
        &self,
        page_file: &mut PageFile<T>,
    ) -> Result<LinkedPage, Error> {
        let count = self.count(page_file)?;
        if self.next_index() < count {
            return Err(Error::AlreadyExists);
        }

        if count < SLOTS_PER_PAGE {
            page_file.seek(SeekFrom::Start(self.offset + SLOT_COUNT_OFFSET as u64))?;
            page_file.write_u8(count + 1)?;
            return Ok(LinkedPage {
                offset: self.offset,
                index: Some(self.next_index()),
            });
        }

        if self.next_page_offset(page_file)? != NO_NEXT_PAGE {
            return Err(Error::AlreadyExists);
        }
        let next = LinkedPage {
            offset: page_file.new_page(None)?,
            index: Some(0),
        };
        next.reset(page_file, 1)?;

        page_file.seek(SeekFrom::Start(self.offset + NEXT_PAGE_OFFSET as u64))?;
        page_file.write_u64::<LittleEndian>(next.offset)?;
        log::debug!("meta chain extended with page {}", next.offset);
        Ok(next)
    }

    pub fn metadata<T: Read + Seek>(&self, page_file: &mut PageFile<T>) -> Result<Vec<u8>, Error> {
        let offset = self.slot_offset()?;
        page_file.seek(SeekFrom::Start(offset + SLOT_METADATA_LENGTH_OFFSET as u64))?;
        let length = page_file.read_u8()?;
        let mut buf = vec![0u8; length as usize];
        page_file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn set_metadata<T: Write + Seek>(
        &self,
        page_file: &mut PageFile<T>,
        data: &[u8],
    ) -> Result<(), Error> {
        let offset = self.slot_offset()?;
        if data.len() > MAX_METADATA_SIZE {
            return Err(Error::MetadataTooLarge(data.len()));
        }
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(data.len() as u8);
        buf.extend_from_slice(data);
        page_file.seek(SeekFrom::Start(offset + SLOT_METADATA_LENGTH_OFFSET as u64))?;
        page_file.write_all(&buf)?;
        Ok(())
    }

    /// Every slot from here to the end of the chain. Debugging aid.
    pub fn collect<T: Read + Write + Seek>(
        &self,
        page_file: &mut PageFile<T>,
    ) -> Result<Vec<LinkedPage>, Error> {
        let mut slots = Vec::new();
        if self.index.is_some() {
            slots.push(*self);
        }
        let mut node = *self;
        while let Some(next) = node.next(page_file)? {
            slots.push(next);
            node = next;
        }
        Ok(slots)
    }
}

impl<T: Read + Write + Seek> MetaPage<T> for LinkedPage {
    fn root(&self, page_file: &mut PageFile<T>) -> Result<MemoryPointer, Error> {
        let offset = self.slot_offset()?;
        page_file.seek(SeekFrom::Start(offset + SLOT_ROOT_OFFSET as u64))?;
        let root_offset = page_file.read_u64::<LittleEndian>()?;
        let length = page_file.read_u32::<LittleEndian>()?;
        Ok(MemoryPointer::new(root_offset, length))
    }

    fn set_root(
        &mut self,
        page_file: &mut PageFile<T>,
        root: MemoryPointer,
    ) -> Result<(), Error> {
        let offset = self.slot_offset()?;
        page_file.seek(SeekFrom::Start(offset + SLOT_ROOT_OFFSET as u64))?;
        page_file.write_u64::<LittleEndian>(root.offset)?;
        page_file.write_u32::<LittleEndian>(root.length)?;
        Ok(())
    }
}

impl fmt::Display for LinkedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "LinkedPage{{offset: {:x}, index: {}}}", self.offset, index),
            None => write!(f, "LinkedPage{{offset: {:x}, head}}", self.offset),
        }
    }
}
