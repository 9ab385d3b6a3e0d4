use crate::error::Error;
use crate::page::Page;
use crate::page_layout::{MAX_FREE_PAGE_INDEXES, PAGE_SIZE, PTR_SIZE};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// PageFile partitions a byte store into fixed size pages.
///
/// Page 0 is reserved for the free page index: a ring of up to 512 offsets of
/// pages that were released and may be handed out again before the file is
/// extended. Every other page is handed out by `new_page`.
///
/// In debug builds reads and writes that would straddle a page boundary panic.
pub struct PageFile<T> {
    inner: T,

    // local cache of free pages to avoid reading page 0 too often.
    free_page_indexes: [u64; MAX_FREE_PAGE_INDEXES],
    free_page_head: usize,
    free_page_count: usize,

    // number of allocated pages, excluding page 0.
    last_page: u64,
}

impl<T: Read + Write + Seek> PageFile<T> {
    /// Opens the page file, initializing the free page index when the store is empty.
    pub fn new(mut inner: T) -> Result<PageFile<T>, Error> {
        let len = inner.seek(SeekFrom::End(0))?;
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::PageFileCorrupt(format!(
                "file size {} is not a multiple of the page size",
                len
            )));
        }

        let mut pf = PageFile {
            inner,
            free_page_indexes: [0; MAX_FREE_PAGE_INDEXES],
            free_page_head: 0,
            free_page_count: 0,
            last_page: 0,
        };

        pf.inner.seek(SeekFrom::Start(0))?;
        if len == 0 {
            Page::default().write_to(&mut pf.inner)?;
            return Ok(pf);
        }

        let page = Page::read_from(&mut pf.inner)?;
        for i in 0..MAX_FREE_PAGE_INDEXES {
            let offset = page.get_u64_from_offset(i * PTR_SIZE);
            if offset == 0 {
                break;
            }
            if offset % PAGE_SIZE as u64 != 0 || offset >= len {
                return Err(Error::PageFileCorrupt(format!(
                    "free page index holds invalid offset {}",
                    offset
                )));
            }
            pf.free_page_indexes[pf.free_page_head] = offset;
            pf.free_page_head = (pf.free_page_head + 1) % MAX_FREE_PAGE_INDEXES;
            pf.free_page_count += 1;
        }
        pf.last_page = len / PAGE_SIZE as u64 - 1;
        Ok(pf)
    }

    pub fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    /// Number of allocated pages, excluding the free page index.
    pub fn page_count(&self) -> u64 {
        self.last_page
    }

    /// Byte offset of the i-th allocated page.
    pub fn page(&self, i: u64) -> u64 {
        // i + 1 because the first page is reserved for the free page indexes.
        (i + 1) * PAGE_SIZE as u64
    }

    /// Returns the offset of a page ready for writing and leaves the store
    /// positioned at it. Freed pages are reused, oldest first, before the
    /// file grows. The page is filled with `prefill` and zero padded.
    pub fn new_page(&mut self, prefill: Option<&[u8]>) -> Result<u64, Error> {
        let page = match prefill {
            Some(prefix) => Page::from_prefix(prefix)?,
            None => Page::default(),
        };

        let offset = match self.pop_free_page()? {
            Some(offset) => offset,
            None => {
                self.last_page += 1;
                self.last_page * PAGE_SIZE as u64
            }
        };
        log::debug!("allocated page at offset {}", offset);

        self.inner.seek(SeekFrom::Start(offset))?;
        page.write_to(&mut self.inner)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(offset)
    }

    /// Releases the page at `offset` so a later `new_page` can reuse it.
    pub fn free_page(&mut self, offset: u64) -> Result<(), Error> {
        if offset == 0 || offset % PAGE_SIZE as u64 != 0 {
            return Err(Error::PageMisaligned(offset));
        }
        if self.free_pages().any(|free| free == offset) {
            return Err(Error::AlreadyFree(offset));
        }
        if self.free_page_count == MAX_FREE_PAGE_INDEXES {
            return Err(Error::RingFull);
        }

        // push to the head
        self.free_page_indexes[self.free_page_head] = offset;
        self.free_page_head = (self.free_page_head + 1) % MAX_FREE_PAGE_INDEXES;
        self.free_page_count += 1;
        log::debug!("freed page at offset {}", offset);

        self.write_free_page_indexes()
    }

    /// Number of pages waiting in the free page index.
    pub fn free_page_count(&self) -> usize {
        self.free_page_count
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn tail(&self) -> usize {
        (self.free_page_head + MAX_FREE_PAGE_INDEXES - self.free_page_count) % MAX_FREE_PAGE_INDEXES
    }

    /// Free pages from oldest to newest.
    fn free_pages(&self) -> impl Iterator<Item = u64> + '_ {
        let tail = self.tail();
        (0..self.free_page_count)
            .map(move |i| self.free_page_indexes[(tail + i) % MAX_FREE_PAGE_INDEXES])
    }

    fn pop_free_page(&mut self) -> Result<Option<u64>, Error> {
        if self.free_page_count == 0 {
            return Ok(None);
        }
        // pop from the tail
        let tail = self.tail();
        let offset = self.free_page_indexes[tail];
        self.free_page_indexes[tail] = 0;
        self.free_page_count -= 1;

        self.write_free_page_indexes()?;
        Ok(Some(offset))
    }

    fn write_free_page_indexes(&mut self) -> Result<(), Error> {
        let mut page = Page::default();
        for (i, offset) in self.free_pages().enumerate() {
            page.put_u64_at_offset(i * PTR_SIZE, offset);
        }
        self.inner.seek(SeekFrom::Start(0))?;
        page.write_to(&mut self.inner)
    }
}

impl<T: Seek> PageFile<T> {
    fn check_page_boundary(&mut self, len: usize, op: &str) -> io::Result<()> {
        let position = self.inner.stream_position()?;
        if (position % PAGE_SIZE as u64) as usize + len > PAGE_SIZE {
            panic!(
                "{} {} bytes at offset {} crosses a page boundary",
                op, len, position
            );
        }
        Ok(())
    }
}

impl<T: Read + Seek> Read for PageFile<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if cfg!(debug_assertions) {
            self.check_page_boundary(buf.len(), "reading")?;
        }
        self.inner.read(buf)
    }
}

impl<T: Write + Seek> Write for PageFile<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if cfg!(debug_assertions) {
            self.check_page_boundary(buf.len(), "writing")?;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Seek> Seek for PageFile<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_page_file() -> PageFile<Cursor<Vec<u8>>> {
        PageFile::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn initializes_free_page_index() {
        let pf = new_page_file();
        assert_eq!(pf.get_ref().get_ref().len(), PAGE_SIZE);
        assert_eq!(pf.page_count(), 0);
        assert_eq!(pf.page(0), PAGE_SIZE as u64);
    }

    #[test]
    fn allocates_first_page() {
        let mut pf = new_page_file();
        let offset = pf.new_page(None).unwrap();
        assert_eq!(offset, PAGE_SIZE as u64);
        assert_eq!(pf.page_count(), 1);
    }

    #[test]
    fn new_page_seeks_to_page() {
        let mut pf = new_page_file();
        let first = pf.new_page(None).unwrap();
        assert_eq!(pf.stream_position().unwrap(), first);
        let second = pf.new_page(None).unwrap();
        assert_eq!(second, 2 * PAGE_SIZE as u64);
        assert_eq!(pf.stream_position().unwrap(), second);
    }

    #[test]
    fn allocates_page_with_data() {
        let mut pf = new_page_file();
        let offset = pf.new_page(Some(b"hello")).unwrap();
        pf.seek(SeekFrom::Start(offset)).unwrap();
        let mut buf = [0u8; 5];
        pf.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(pf.get_ref().get_ref().len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn oversized_prefill_fails() {
        let mut pf = new_page_file();
        assert!(pf.new_page(Some(&[0u8; PAGE_SIZE + 1])).is_err());
        assert_eq!(pf.page_count(), 0);
    }

    #[test]
    fn free_page_reuses_page() {
        let mut pf = new_page_file();
        let first = pf.new_page(None).unwrap();
        let second = pf.new_page(None).unwrap();
        assert_ne!(first, second);

        pf.free_page(first).unwrap();
        assert_eq!(pf.new_page(None).unwrap(), first);
        assert_eq!(pf.new_page(None).unwrap(), 3 * PAGE_SIZE as u64);
    }

    #[test]
    fn freed_pages_come_back_in_fifo_order() {
        let mut pf = new_page_file();
        let offsets: Vec<u64> = (0..5).map(|_| pf.new_page(None).unwrap()).collect();
        for offset in &offsets {
            pf.free_page(*offset).unwrap();
        }
        let reused: Vec<u64> = (0..5).map(|_| pf.new_page(None).unwrap()).collect();
        assert_eq!(reused, offsets);
    }

    #[test]
    fn free_page_behaves_like_a_circular_buffer() {
        let mut pf = new_page_file();
        let offsets: Vec<u64> = (0..MAX_FREE_PAGE_INDEXES + 10)
            .map(|_| pf.new_page(None).unwrap())
            .collect();
        // wrap the head around the ring a few times.
        for round in 0..3 {
            for offset in offsets.iter().skip(round * 100).take(300) {
                pf.free_page(*offset).unwrap();
            }
            for offset in offsets.iter().skip(round * 100).take(300) {
                assert_eq!(pf.new_page(None).unwrap(), *offset);
            }
        }
        assert_eq!(pf.free_page_count(), 0);
    }

    #[test]
    fn full_ring_rejects_free() {
        let mut pf = new_page_file();
        let offsets: Vec<u64> = (0..MAX_FREE_PAGE_INDEXES + 1)
            .map(|_| pf.new_page(None).unwrap())
            .collect();
        for offset in offsets.iter().take(MAX_FREE_PAGE_INDEXES) {
            pf.free_page(*offset).unwrap();
        }
        assert!(matches!(
            pf.free_page(offsets[MAX_FREE_PAGE_INDEXES]),
            Err(Error::RingFull)
        ));
    }

    #[test]
    fn double_free_fails() {
        let mut pf = new_page_file();
        let offset = pf.new_page(None).unwrap();
        pf.free_page(offset).unwrap();
        assert!(matches!(pf.free_page(offset), Err(Error::AlreadyFree(o)) if o == offset));
    }

    #[test]
    fn misaligned_free_fails() {
        let mut pf = new_page_file();
        pf.new_page(None).unwrap();
        assert!(matches!(pf.free_page(PAGE_SIZE as u64 + 1), Err(Error::PageMisaligned(_))));
        assert!(matches!(pf.free_page(0), Err(Error::PageMisaligned(0))));
    }

    #[test]
    fn free_page_index_survives_reopen() {
        let mut pf = new_page_file();
        let offsets: Vec<u64> = (0..4).map(|_| pf.new_page(None).unwrap()).collect();
        pf.free_page(offsets[2]).unwrap();
        pf.free_page(offsets[0]).unwrap();

        let mut reopened = PageFile::new(pf.into_inner()).unwrap();
        assert_eq!(reopened.page_count(), 4);
        assert_eq!(reopened.free_page_count(), 2);
        assert_eq!(reopened.new_page(None).unwrap(), offsets[2]);
        assert_eq!(reopened.new_page(None).unwrap(), offsets[0]);
        assert_eq!(reopened.new_page(None).unwrap(), 5 * PAGE_SIZE as u64);
    }

    #[test]
    fn rejects_partial_pages() {
        let result = PageFile::new(Cursor::new(vec![0u8; PAGE_SIZE + 7]));
        assert!(matches!(result, Err(Error::PageFileCorrupt(_))));
    }

    #[test]
    fn rejects_malformed_free_page_index() {
        let mut store = vec![0u8; 2 * PAGE_SIZE];
        store[..8].copy_from_slice(&13u64.to_le_bytes());
        let result = PageFile::new(Cursor::new(store));
        assert!(matches!(result, Err(Error::PageFileCorrupt(_))));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "crosses a page boundary")]
    fn write_across_page_boundary_panics() {
        let mut pf = new_page_file();
        let offset = pf.new_page(None).unwrap();
        pf.seek(SeekFrom::Start(offset + PAGE_SIZE as u64 - 4)).unwrap();
        let _ = pf.write(&[0u8; 8]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "crosses a page boundary")]
    fn read_across_page_boundary_panics() {
        let mut pf = new_page_file();
        let offset = pf.new_page(None).unwrap();
        pf.new_page(None).unwrap();
        pf.seek(SeekFrom::Start(offset + 1)).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        let _ = pf.read(&mut buf);
    }
}
