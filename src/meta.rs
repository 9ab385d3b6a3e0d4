use crate::error::Error;
use crate::field_type::FieldType;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

/// The only index file version this crate reads and writes.
pub const CURRENT_VERSION: u8 = 1;

/// The layout of the data file being indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Jsonl = 0,
    Csv = 1,
}

impl TryFrom<u8> for Format {
    type Error = Error;

    fn try_from(b: u8) -> Result<Format, Error> {
        match b {
            0 => Ok(Format::Jsonl),
            1 => Ok(Format::Csv),
            other => Err(Error::Corrupt(format!("unrecognized file format {}", other))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Jsonl => write!(f, "jsonl"),
            Format::Csv => write!(f, "csv"),
        }
    }
}

/// File level metadata, kept in the first meta slot.
///
/// `u8 version | u8 format | u64 read_offset | u64 entries`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub version: u8,
    pub format: Format,
    /// Bytes of the data file indexed so far.
    pub read_offset: u64,
    /// Records indexed so far.
    pub entries: u64,
}

impl FileMeta {
    pub fn new(format: Format) -> FileMeta {
        FileMeta {
            version: CURRENT_VERSION,
            format,
            read_offset: 0,
            entries: 0,
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(18);
        buf.write_u8(self.version)?;
        buf.write_u8(self.format as u8)?;
        buf.write_u64::<LittleEndian>(self.read_offset)?;
        buf.write_u64::<LittleEndian>(self.entries)?;
        Ok(buf)
    }

    pub fn unmarshal(buf: &[u8]) -> Result<FileMeta, Error> {
        let mut r = Cursor::new(buf);
        let decode = |r: &mut Cursor<&[u8]>| -> std::io::Result<(u8, u8, u64, u64)> {
            Ok((
                r.read_u8()?,
                r.read_u8()?,
                r.read_u64::<LittleEndian>()?,
                r.read_u64::<LittleEndian>()?,
            ))
        };
        let (version, format, read_offset, entries) = decode(&mut r)
            .map_err(|_| Error::Corrupt(format!("file metadata of {} bytes", buf.len())))?;
        if version != CURRENT_VERSION {
            return Err(Error::VersionUnsupported(version));
        }
        Ok(FileMeta {
            version,
            format: Format::try_from(format)?,
            read_offset,
            entries,
        })
    }
}

/// Per field metadata, kept in every slot after the first.
///
/// `u32 name_length | name | u64 field_type | u16 width | u64 total_field_value_length`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexMeta {
    pub field_name: String,
    pub field_type: FieldType,
    pub width: u16,
    /// Sum of the parsed key lengths inserted into this field.
    pub total_field_value_length: u64,
}

impl IndexMeta {
    pub fn new(field_name: &str, field_type: FieldType) -> IndexMeta {
        IndexMeta {
            field_name: field_name.to_string(),
            field_type,
            width: field_type.width(),
            total_field_value_length: 0,
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>, Error> {
        let name = self.field_name.as_bytes();
        let name_len = u32::try_from(name.len()).map_err(|_| Error::MetadataTooLarge(name.len()))?;
        let mut buf = Vec::with_capacity(4 + name.len() + 8 + 2 + 8);
        buf.write_u32::<LittleEndian>(name_len)?;
        buf.extend_from_slice(name);
        buf.write_u64::<LittleEndian>(self.field_type.bits())?;
        buf.write_u16::<LittleEndian>(self.width)?;
        buf.write_u64::<LittleEndian>(self.total_field_value_length)?;
        Ok(buf)
    }

    pub fn unmarshal(buf: &[u8]) -> Result<IndexMeta, Error> {
        let corrupt = || Error::Corrupt(format!("index metadata of {} bytes", buf.len()));
        let mut r = Cursor::new(buf);
        let name_len = r.read_u32::<LittleEndian>().map_err(|_| corrupt())? as usize;
        if name_len > buf.len() {
            return Err(corrupt());
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name).map_err(|_| corrupt())?;
        let field_name = String::from_utf8(name)
            .map_err(|e| Error::Corrupt(format!("field name is not utf-8: {}", e)))?;

        let field_type = r.read_u64::<LittleEndian>().map_err(|_| corrupt())?;
        let width = r.read_u16::<LittleEndian>().map_err(|_| corrupt())?;
        let total_field_value_length = r.read_u64::<LittleEndian>().map_err(|_| corrupt())?;
        Ok(IndexMeta {
            field_name,
            field_type: FieldType::from_bits_retain(field_type),
            width,
            total_field_value_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_meta_layout() {
        let meta = FileMeta {
            version: CURRENT_VERSION,
            format: Format::Csv,
            read_offset: 0x0102,
            entries: 3,
        };
        let buf = meta.marshal().unwrap();
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[..4], &[1, 1, 0x02, 0x01]);
        assert_eq!(FileMeta::unmarshal(&buf).unwrap(), meta);
    }

    #[test]
    fn file_meta_rejects_unknown_version_and_format() {
        let mut buf = FileMeta::new(Format::Jsonl).marshal().unwrap();
        buf[0] = 2;
        assert!(matches!(FileMeta::unmarshal(&buf), Err(Error::VersionUnsupported(2))));

        buf[0] = CURRENT_VERSION;
        buf[1] = 9;
        assert!(matches!(FileMeta::unmarshal(&buf), Err(Error::Corrupt(_))));
        assert!(matches!(FileMeta::unmarshal(&buf[..5]), Err(Error::Corrupt(_))));
    }

    #[test]
    fn index_meta_layout() {
        let meta = IndexMeta {
            field_name: "a.b".to_string(),
            field_type: FieldType::FLOAT64,
            width: 9,
            total_field_value_length: 16,
        };
        let buf = meta.marshal().unwrap();
        assert_eq!(buf.len(), 4 + 3 + 8 + 2 + 8);
        assert_eq!(&buf[..7], &[3, 0, 0, 0, b'a', b'.', b'b']);
        assert_eq!(IndexMeta::unmarshal(&buf).unwrap(), meta);
    }

    #[test]
    fn index_meta_width_follows_type() {
        assert_eq!(IndexMeta::new("x", FieldType::BOOLEAN).width, 2);
        assert_eq!(IndexMeta::new("x", FieldType::STRING).width, 0);
    }

    #[test]
    fn truncated_index_meta_is_corrupt() {
        let buf = IndexMeta::new("name", FieldType::STRING).marshal().unwrap();
        assert!(IndexMeta::unmarshal(&buf[..buf.len() - 1]).is_err());
        assert!(IndexMeta::unmarshal(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
