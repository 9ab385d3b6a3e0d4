use crate::btree::BPTree;
use crate::error::Error;
use crate::field_type::FieldType;
use crate::handler::{FieldOperation, Handler, Outcome};
use crate::linked_page::{LinkedPage, MetaPage};
use crate::meta::{FileMeta, Format, IndexMeta};
use crate::page_layout::MAX_METADATA_SIZE;
use crate::pager::PageFile;
use crate::pointer::MemoryPointer;
use std::io::{Read, Seek, Write};

/// A field index: the meta slot owning its tree and the slot's decoded metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    pub slot: LinkedPage,
    pub meta: IndexMeta,
}

/// The index file of one data file.
///
/// The first slot of the meta chain holds the `FileMeta`; every following
/// slot is one field index, in the order the fields were first seen.
pub struct IndexFile<T> {
    page_file: PageFile<T>,
    file_meta: LinkedPage,
    format: Format,
    // field slots, in chain order.
    indexes: Vec<Index>,
}

impl<T: Read + Write + Seek> IndexFile<T> {
    /// Opens the index in `backing`, initializing it when empty.
    pub fn new(backing: T, format: Format) -> Result<IndexFile<T>, Error> {
        let mut page_file = PageFile::new(backing)?;
        let head = LinkedPage::open(&mut page_file)?;

        let file_meta = match head.next(&mut page_file)? {
            Some(slot) => {
                let meta = FileMeta::unmarshal(&slot.metadata(&mut page_file)?)?;
                if meta.format != format {
                    return Err(Error::FormatMismatch {
                        expected: format,
                        found: meta.format,
                    });
                }
                slot
            }
            None => {
                let slot = head.add_next(&mut page_file)?;
                slot.set_metadata(&mut page_file, &FileMeta::new(format).marshal()?)?;
                slot
            }
        };

        let mut indexes = Vec::new();
        let mut slot = file_meta;
        while let Some(next) = slot.next(&mut page_file)? {
            let meta = IndexMeta::unmarshal(&next.metadata(&mut page_file)?)?;
            indexes.push(Index { slot: next, meta });
            slot = next;
        }
        log::debug!("opened {} index with {} fields", format, indexes.len());

        Ok(IndexFile {
            page_file,
            file_meta,
            format,
            indexes,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn metadata(&mut self) -> Result<FileMeta, Error> {
        FileMeta::unmarshal(&self.file_meta.metadata(&mut self.page_file)?)
    }

    pub fn set_metadata(&mut self, meta: &FileMeta) -> Result<(), Error> {
        self.file_meta
            .set_metadata(&mut self.page_file, &meta.marshal()?)
    }

    /// Every field index, in the order the fields were first seen.
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Whether no field has been indexed yet.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    fn find_or_create_position(&mut self, name: &str, field_type: FieldType) -> Result<usize, Error> {
        if let Some(i) = self
            .indexes
            .iter()
            .position(|index| index.meta.field_name == name && index.meta.field_type.contains(field_type))
        {
            return Ok(i);
        }

        let meta = IndexMeta::new(name, field_type);
        let buf = meta.marshal()?;
        if buf.len() > MAX_METADATA_SIZE {
            return Err(Error::MetadataTooLarge(buf.len()));
        }
        let tail = self.indexes.last().map_or(self.file_meta, |index| index.slot);
        let mut slot = tail.add_next(&mut self.page_file)?;
        slot.set_metadata(&mut self.page_file, &buf)?;
        slot.set_root(&mut self.page_file, MemoryPointer::default())?;
        log::debug!("created index {} ({}) in {}", name, field_type, slot);

        self.indexes.push(Index { slot, meta });
        Ok(self.indexes.len() - 1)
    }

    /// The index for `name` holding values of `field_type`. A field seen with
    /// a new type gets its own index.
    pub fn find_or_create_index(&mut self, name: &str, field_type: FieldType) -> Result<Index, Error> {
        let i = self.find_or_create_position(name, field_type)?;
        Ok(self.indexes[i].clone())
    }

    /// The tree of `index`, resolving referenced keys through `data`.
    pub fn tree<'a>(&'a mut self, index: &Index, data: &'a [u8]) -> BPTree<'a, T, LinkedPage> {
        BPTree::new(
            &mut self.page_file,
            index.slot,
            data,
            &self.format,
            index.meta.width,
        )
    }

    /// Indexes every complete record of `data` past the stored read offset.
    ///
    /// `data` must start with everything previously synchronized. On failure
    /// the progress made by the preceding records is still persisted.
    pub fn synchronize(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut meta = self.metadata()?;
        if meta.read_offset > data.len() as u64 {
            return Err(Error::Corrupt(format!(
                "read offset {} is past the end of the {} byte data file",
                meta.read_offset,
                data.len()
            )));
        }

        let mut handler = Handler::new(self.format);
        if meta.read_offset > 0 && handler.expects_header() {
            // resuming, so read the header again
            if let Some((_, record, _)) = lines(data).find(|(_, record, _)| !is_blank(record)) {
                handler
                    .handle(record, 0)
                    .map_err(|reason| Error::parse(0, reason))?;
            }
        }

        let start = meta;
        let result = self.synchronize_records(data, &mut handler, &mut meta);
        if meta != start {
            self.set_metadata(&meta)?;
        }
        log::info!(
            "synchronized {} records, read offset {} -> {}",
            meta.entries - start.entries,
            start.read_offset,
            meta.read_offset
        );
        result
    }

    fn synchronize_records(
        &mut self,
        data: &[u8],
        handler: &mut Handler,
        meta: &mut FileMeta,
    ) -> Result<(), Error> {
        let offset = meta.read_offset as usize;
        for (start, record, end) in lines(&data[offset..]) {
            if !is_blank(record) {
                let base = (offset + start) as u64;
                let pointer = MemoryPointer::new(base, record.len() as u32);
                match handler.handle(record, base) {
                    Ok(Outcome::Header) => log::debug!("read header at {}", base),
                    Ok(Outcome::Fields(ops)) => {
                        log::debug!("indexing {} fields of record at {}", ops.len(), base);
                        self.apply(ops, pointer, data)?;
                        meta.entries += 1;
                    }
                    Err(reason) => {
                        log::warn!("failed to parse record at {}: {}", base, reason);
                        return Err(Error::parse(base, reason));
                    }
                }
            }
            meta.read_offset = (offset + end) as u64;
        }
        Ok(())
    }

    fn apply(&mut self, ops: Vec<FieldOperation>, record: MemoryPointer, data: &[u8]) -> Result<(), Error> {
        for op in ops {
            let i = self.find_or_create_position(&op.name, op.field_type)?;
            let key = match op.key {
                Some(key) => key,
                None => continue,
            };
            let length = key.value.len() as u64;
            let index = self.indexes[i].clone();
            match self.tree(&index, data).insert(key, record) {
                Ok(()) => {}
                // left by an earlier attempt at this record that failed part way
                Err(Error::DuplicateKey(pointer)) => {
                    log::debug!("{} already holds the key at {}", index.meta.field_name, pointer);
                    continue;
                }
                Err(err) => return Err(err),
            }

            let meta = &mut self.indexes[i].meta;
            meta.total_field_value_length += length;
            let buf = meta.marshal()?;
            index.slot.set_metadata(&mut self.page_file, &buf)?;
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &T {
        self.page_file.get_ref()
    }

    pub fn into_inner(self) -> T {
        self.page_file.into_inner()
    }
}

/// Newline terminated lines of `data` as `(start, record, end)`, where `end`
/// is just past the newline. A trailing `\r` is dropped from the record and
/// an unterminated tail is left unread.
fn lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8], usize)> + '_ {
    let mut start = 0;
    data.split_inclusive(|b| *b == b'\n')
        .take_while(|line| line.last() == Some(&b'\n'))
        .map(move |line| {
            let mut record = &line[..line.len() - 1];
            if record.last() == Some(&b'\r') {
                record = &record[..record.len() - 1];
            }
            let begin = start;
            start += line.len();
            (begin, record, start)
        })
}

fn is_blank(record: &[u8]) -> bool {
    record.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_index(format: Format) -> IndexFile<Cursor<Vec<u8>>> {
        IndexFile::new(Cursor::new(Vec::new()), format).unwrap()
    }

    #[test]
    fn new_index_is_empty() {
        let mut f = new_index(Format::Jsonl);
        assert!(f.is_empty());
        let meta = f.metadata().unwrap();
        assert_eq!(meta, FileMeta::new(Format::Jsonl));
        // free page index, meta page
        assert_eq!(f.get_ref().get_ref().len(), 2 * 4096);
    }

    #[test]
    fn reopen_checks_format() {
        let f = new_index(Format::Csv);
        let backing = f.into_inner();
        assert!(matches!(
            IndexFile::new(backing.clone(), Format::Jsonl),
            Err(Error::FormatMismatch {
                expected: Format::Jsonl,
                found: Format::Csv
            })
        ));
        assert!(IndexFile::new(backing, Format::Csv).is_ok());
    }

    #[test]
    fn reopen_rejects_other_versions() {
        let mut backing = new_index(Format::Jsonl).into_inner().into_inner();
        // version byte of the file meta slot
        backing[4096 + 9 + 13] = 7;
        assert!(matches!(
            IndexFile::new(Cursor::new(backing), Format::Jsonl),
            Err(Error::VersionUnsupported(7))
        ));
    }

    #[test]
    fn fields_are_keyed_by_name_and_type() {
        let mut f = new_index(Format::Jsonl);
        let a = f.find_or_create_index("a", FieldType::STRING).unwrap();
        let b = f.find_or_create_index("a", FieldType::FLOAT64).unwrap();
        assert_ne!(a.slot, b.slot);
        assert_eq!(f.find_or_create_index("a", FieldType::STRING).unwrap(), a);
        assert_eq!(b.meta.width, 9);
        assert_eq!(f.indexes().len(), 2);
    }

    #[test]
    fn long_field_names_do_not_leave_empty_slots() {
        let mut f = new_index(Format::Jsonl);
        let name = "x".repeat(300);
        assert!(matches!(
            f.find_or_create_index(&name, FieldType::STRING),
            Err(Error::MetadataTooLarge(_))
        ));
        let reopened = IndexFile::new(f.into_inner(), Format::Jsonl).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn lines_drop_carriage_returns_and_unterminated_tails() {
        let data = b"a\r\n\n  \nb\nc";
        let got: Vec<(usize, &[u8], usize)> = lines(data).collect();
        assert_eq!(
            got,
            vec![
                (0, &b"a"[..], 3),
                (3, &b""[..], 4),
                (4, &b"  "[..], 7),
                (7, &b"b"[..], 9)
            ]
        );
        assert!(is_blank(got[2].1));
    }

    #[test]
    fn blank_records_are_skipped() {
        let data = b"\n{\"a\":1}\n  \n";
        let mut f = new_index(Format::Jsonl);
        f.synchronize(data).unwrap();
        let meta = f.metadata().unwrap();
        assert_eq!(meta.read_offset, data.len() as u64);
        assert_eq!(meta.entries, 1);

        let a = f.indexes()[0].clone();
        let (_, pointer, _) = f
            .tree(&a, data)
            .find(&crate::pointer::ReferencedValue::unreferenced(1f64.to_bits().to_be_bytes().to_vec()))
            .unwrap();
        assert_eq!(pointer, MemoryPointer::new(1, 7));
    }

    #[test]
    fn synchronize_indexes_records() {
        let data = b"{\"test\":\"test1\",\"n\":1}\n{\"test\":\"test2\",\"n\":2}\n";
        let mut f = new_index(Format::Jsonl);
        f.synchronize(data).unwrap();

        let meta = f.metadata().unwrap();
        assert_eq!(meta.read_offset, data.len() as u64);
        assert_eq!(meta.entries, 2);

        let names: Vec<(String, FieldType)> = f
            .indexes()
            .iter()
            .map(|i| (i.meta.field_name.clone(), i.meta.field_type))
            .collect();
        assert_eq!(
            names,
            vec![
                ("test".to_string(), FieldType::STRING),
                ("n".to_string(), FieldType::FLOAT64)
            ]
        );
        assert_eq!(f.indexes()[0].meta.total_field_value_length, 10);
        assert_eq!(f.indexes()[1].meta.total_field_value_length, 16);

        let n = f.indexes()[1].clone();
        let mut tree = f.tree(&n, data);
        let (_, pointer, found) = tree
            .find(&crate::pointer::ReferencedValue::unreferenced(2f64.to_bits().to_be_bytes().to_vec()))
            .unwrap();
        assert!(found);
        assert_eq!(pointer, MemoryPointer::new(23, 22));
    }

    #[test]
    fn parse_error_keeps_earlier_progress() {
        let data = b"{\"a\":1}\n{\"a\":\n{\"a\":3}\n";
        let mut f = new_index(Format::Jsonl);
        match f.synchronize(data) {
            Err(Error::ParseError { offset, .. }) => assert_eq!(offset, 8),
            other => panic!("expected a parse error, got {:?}", other.err()),
        }
        let meta = f.metadata().unwrap();
        assert_eq!(meta.read_offset, 8);
        assert_eq!(meta.entries, 1);
    }

    #[test]
    fn read_offset_past_the_data_is_rejected() {
        let mut f = new_index(Format::Jsonl);
        f.synchronize(b"{\"a\":1}\n").unwrap();
        assert!(matches!(f.synchronize(b"{}"), Err(Error::Corrupt(_))));
    }
}
