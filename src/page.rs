use crate::error::Error;
use crate::page_layout::{PAGE_SIZE, PTR_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

/// Page is a wrapper for a single page of memory
/// providing some helpful helpers for quick access.
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Default for Page {
    fn default() -> Page {
        Page {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }
}

impl Page {
    /// Builds a page from a prefix, zero padding the remainder.
    pub fn from_prefix(prefix: &[u8]) -> Result<Page, Error> {
        if prefix.len() > PAGE_SIZE {
            return Err(Error::Corrupt(format!(
                "{} bytes do not fit in a page of {} bytes",
                prefix.len(),
                PAGE_SIZE
            )));
        }
        let mut page = Page::default();
        page.data[..prefix.len()].copy_from_slice(prefix);
        Ok(page)
    }

    /// Reads one full page from the current position of `r`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Page, Error> {
        let mut page = Page::default();
        r.read_exact(&mut page.data[..])?;
        Ok(page)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        w.write_all(&self.data[..])?;
        Ok(())
    }

    pub fn get_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    /// Fetches a little-endian u64 stored at `offset`.
    pub fn get_u64_from_offset(&self, offset: usize) -> u64 {
        LittleEndian::read_u64(&self.data[offset..offset + PTR_SIZE])
    }

    pub fn put_u64_at_offset(&mut self, offset: usize, value: u64) {
        LittleEndian::write_u64(&mut self.data[offset..offset + PTR_SIZE], value);
    }
}
