//! Format handlers turn one data file record into a list of field operations.
//!
//! A record is parsed completely before anything is applied to the index, so
//! a malformed record never leaves half of its fields indexed.

pub mod csv;
pub mod json_tokenizer;
pub mod jsonl;

use crate::error::Error;
use crate::field_type::FieldType;
use crate::meta::Format;
use crate::node::DataParser;
use crate::pointer::ReferencedValue;

/// One field occurrence in a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldOperation {
    /// Dotted path of the field.
    pub name: String,
    pub field_type: FieldType,
    /// The key to insert; `None` for objects and arrays, which only register
    /// the field.
    pub key: Option<ReferencedValue>,
}

impl FieldOperation {
    pub fn insert(name: String, field_type: FieldType, key: ReferencedValue) -> FieldOperation {
        FieldOperation {
            name,
            field_type,
            key: Some(key),
        }
    }

    pub fn container(name: String, field_type: FieldType) -> FieldOperation {
        FieldOperation {
            name,
            field_type,
            key: None,
        }
    }
}

pub enum Outcome {
    /// The record named the columns of a CSV file.
    Header,
    Fields(Vec<FieldOperation>),
}

/// Per synchronization record state. CSV files start by expecting their
/// header row; JSON-lines records are all data.
pub enum Handler {
    Jsonl,
    Csv { headers: Option<Vec<String>> },
}

impl Handler {
    pub fn new(format: Format) -> Handler {
        match format {
            Format::Jsonl => Handler::Jsonl,
            Format::Csv => Handler::Csv { headers: None },
        }
    }

    /// Whether the next record is consumed as a header.
    pub fn expects_header(&self) -> bool {
        matches!(self, Handler::Csv { headers: None })
    }

    /// Parses `record`, which starts at `base` in the data file.
    pub fn handle(&mut self, record: &[u8], base: u64) -> Result<Outcome, String> {
        match self {
            Handler::Jsonl => jsonl::operations(record, base).map(Outcome::Fields),
            Handler::Csv {
                headers: Some(headers),
            } => csv::operations(record, base, headers).map(Outcome::Fields),
            Handler::Csv { headers } => {
                *headers = Some(csv::header(record)?);
                Ok(Outcome::Header)
            }
        }
    }
}

impl Format {
    /// Turns the raw bytes of a single value into key bytes.
    pub fn parse_value(&self, raw: &[u8]) -> Result<Vec<u8>, String> {
        match self {
            Format::Jsonl => jsonl::parse(raw),
            Format::Csv => csv::parse(raw),
        }
    }
}

impl DataParser for Format {
    fn parse(&self, raw: &[u8]) -> Result<Vec<u8>, Error> {
        self.parse_value(raw)
            .map_err(|reason| Error::Corrupt(format!("unparseable key: {}", reason)))
    }
}
