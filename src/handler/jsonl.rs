use crate::field_type::FieldType;
use crate::handler::json_tokenizer::{JsonTokenizer, Token};
use crate::handler::FieldOperation;
use crate::page_layout::ToByte;
use crate::pointer::{MemoryPointer, ReferencedValue};
use byteorder::{BigEndian, ByteOrder};
use std::ops::Range;

/// Turns a raw JSON token into its key bytes.
pub fn parse(raw: &[u8]) -> Result<Vec<u8>, String> {
    match raw.first() {
        Some(b'"') => serde_json::from_slice::<String>(raw)
            .map(String::into_bytes)
            .map_err(|e| format!("invalid string: {}", e)),
        Some(b't') if raw == b"true" => Ok(vec![true.to_byte()]),
        Some(b'f') if raw == b"false" => Ok(vec![false.to_byte()]),
        Some(b'n') if raw == b"null" => Ok(Vec::new()),
        Some(b'-' | b'0'..=b'9') => {
            let n = serde_json::from_slice::<f64>(raw)
                .map_err(|e| format!("invalid number: {}", e))?;
            Ok(float_key(n))
        }
        _ => Err(format!(
            "unexpected token '{}'",
            String::from_utf8_lossy(raw)
        )),
    }
}

pub(crate) fn float_key(n: f64) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    BigEndian::write_u64(&mut buf, n.to_bits());
    buf
}

/// Collects the field operations of one JSON object record starting at
/// `base` in the data file.
pub fn operations(record: &[u8], base: u64) -> Result<Vec<FieldOperation>, String> {
    let mut tokenizer = JsonTokenizer::new(record);
    match tokenizer.next_token()? {
        Some((Token::OpenObject, _)) => {}
        _ => return Err("expected '{' (only json objects are supported at the root)".to_string()),
    }

    let mut parser = RecordParser {
        record,
        base,
        tokenizer,
        ops: Vec::new(),
    };
    parser.object(&[])?;

    if let Some((_, span)) = parser.tokenizer.next_token()? {
        return Err(format!("trailing data at position {}", span.start));
    }
    Ok(parser.ops)
}

struct RecordParser<'a> {
    record: &'a [u8],
    base: u64,
    tokenizer: JsonTokenizer<'a>,
    ops: Vec<FieldOperation>,
}

impl<'a> RecordParser<'a> {
    fn expect(&mut self) -> Result<(Token, Range<usize>), String> {
        self.tokenizer
            .next_token()?
            .ok_or_else(|| format!("unexpected end of record at position {}", self.tokenizer.position()))
    }

    fn pointer(&self, span: &Range<usize>) -> MemoryPointer {
        MemoryPointer::new(self.base + span.start as u64, span.len() as u32)
    }

    // object consumes members up to and including the closing brace.
    fn object(&mut self, path: &[String]) -> Result<(), String> {
        let (mut token, mut span) = self.expect()?;
        if token == Token::CloseObject {
            return Ok(());
        }
        loop {
            if token != Token::String {
                return Err(format!("expected string key at position {}", span.start));
            }
            let key = serde_json::from_slice::<String>(&self.record[span.clone()])
                .map_err(|e| format!("invalid key: {}", e))?;
            match self.expect()? {
                (Token::Colon, _) => {}
                (_, span) => return Err(format!("expected ':' at position {}", span.start)),
            }

            let mut name_path = path.to_vec();
            name_path.push(key);
            self.value(name_path)?;

            match self.expect()? {
                (Token::Comma, _) => {
                    let next = self.expect()?;
                    token = next.0;
                    span = next.1;
                }
                (Token::CloseObject, _) => return Ok(()),
                (_, span) => {
                    return Err(format!("expected ',' or '}}' at position {}", span.start))
                }
            }
        }
    }

    fn value(&mut self, path: Vec<String>) -> Result<(), String> {
        let name = path.join(".");
        let (token, span) = self.expect()?;
        let field_type = match token {
            Token::String => FieldType::STRING,
            Token::Number => FieldType::FLOAT64,
            Token::Boolean(_) => FieldType::BOOLEAN,
            Token::Null => FieldType::NULL,
            Token::OpenObject => {
                self.ops.push(FieldOperation::container(name, FieldType::OBJECT));
                return self.object(&path);
            }
            Token::OpenArray => {
                // arrays are not expanded into keys
                self.ops.push(FieldOperation::container(name, FieldType::ARRAY));
                return self.skip_array();
            }
            _ => return Err(format!("unexpected token at position {}", span.start)),
        };

        let value = parse(&self.record[span.clone()])?;
        let key = ReferencedValue::new(self.pointer(&span), value);
        self.ops.push(FieldOperation::insert(name, field_type, key));
        Ok(())
    }

    // skip_value checks a value that is not indexed, such as array elements.
    fn skip_value(&mut self, token: Token, span: Range<usize>) -> Result<(), String> {
        match token {
            Token::String | Token::Number | Token::Boolean(_) | Token::Null => {
                parse(&self.record[span]).map(drop)
            }
            Token::OpenArray => self.skip_array(),
            Token::OpenObject => self.skip_object(),
            _ => Err(format!("unexpected token at position {}", span.start)),
        }
    }

    fn skip_array(&mut self) -> Result<(), String> {
        let (mut token, mut span) = self.expect()?;
        if token == Token::CloseArray {
            return Ok(());
        }
        loop {
            self.skip_value(token, span)?;
            match self.expect()? {
                (Token::Comma, _) => (token, span) = self.expect()?,
                (Token::CloseArray, _) => return Ok(()),
                (_, span) => {
                    return Err(format!("expected ',' or ']' at position {}", span.start))
                }
            }
        }
    }

    fn skip_object(&mut self) -> Result<(), String> {
        let (mut token, mut span) = self.expect()?;
        if token == Token::CloseObject {
            return Ok(());
        }
        loop {
            if token != Token::String {
                return Err(format!("expected string key at position {}", span.start));
            }
            match self.expect()? {
                (Token::Colon, _) => {}
                (_, span) => return Err(format!("expected ':' at position {}", span.start)),
            }
            let (value, value_span) = self.expect()?;
            self.skip_value(value, value_span)?;
            match self.expect()? {
                (Token::Comma, _) => (token, span) = self.expect()?,
                (Token::CloseObject, _) => return Ok(()),
                (_, span) => {
                    return Err(format!("expected ',' or '}}' at position {}", span.start))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(ops: &[FieldOperation]) -> Vec<(&str, FieldType)> {
        ops.iter()
            .map(|op| (op.name.as_str(), op.field_type))
            .collect()
    }

    #[test]
    fn string_value_points_at_its_token() {
        let ops = operations(br#"{"test":"test1"}"#, 100).unwrap();
        assert_eq!(summary(&ops), vec![("test", FieldType::STRING)]);
        let key = ops[0].key.as_ref().unwrap();
        assert_eq!(key.value, b"test1");
        assert_eq!(key.data_pointer, MemoryPointer::new(108, 7));
    }

    #[test]
    fn nested_objects_use_dotted_names() {
        let ops = operations(br#"{"a":{"b":{"c":1}},"d":[1,[2]],"e":null,"f":false}"#, 0).unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                ("a", FieldType::OBJECT),
                ("a.b", FieldType::OBJECT),
                ("a.b.c", FieldType::FLOAT64),
                ("d", FieldType::ARRAY),
                ("e", FieldType::NULL),
                ("f", FieldType::BOOLEAN),
            ]
        );
        assert!(ops[0].key.is_none());
        assert!(ops[3].key.is_none());
        assert_eq!(ops[2].key.as_ref().unwrap().value, 1f64.to_bits().to_be_bytes());
        assert!(ops[4].key.as_ref().unwrap().value.is_empty());
        assert_eq!(ops[5].key.as_ref().unwrap().value, vec![0]);
    }

    #[test]
    fn escapes_are_decoded() {
        let ops = operations(br#"{"k\"ey":"a\nb"}"#, 0).unwrap();
        assert_eq!(ops[0].name, "k\"ey");
        assert_eq!(ops[0].key.as_ref().unwrap().value, b"a\nb");
    }

    #[test]
    fn array_elements_are_checked_but_not_indexed() {
        let ops = operations(br#"{"a":[],"b":[{"c":[true,null]},"x",-1e2],"d":1}"#, 0).unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                ("a", FieldType::ARRAY),
                ("b", FieldType::ARRAY),
                ("d", FieldType::FLOAT64),
            ]
        );
    }

    #[test]
    fn empty_object_has_no_fields() {
        assert!(operations(b"{ }", 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_records() {
        for record in [
            &b"[1,2]"[..],
            b"{\"a\":1",
            b"{\"a\" 1}",
            b"{\"a\":1,}",
            b"{1:2}",
            b"{\"a\":1} x",
            b"{\"a\":01.2.3}",
            b"{\"a\":[1 2 3]}",
            b"{\"a\":[}]}",
            b"{\"a\":[,,:]}",
            b"{\"a\":[1,]}",
            b"{\"a\":[{\"b\"}]}",
            b"{\"a\":[[1]}",
        ] {
            assert!(operations(record, 0).is_err(), "{:?}", String::from_utf8_lossy(record));
        }
    }

    #[test]
    fn parse_round_trips_tokens() {
        assert_eq!(parse(br#""x""#).unwrap(), b"x");
        assert_eq!(parse(b"true").unwrap(), vec![1]);
        assert_eq!(parse(b"null").unwrap(), Vec::<u8>::new());
        assert_eq!(parse(b"-2.5").unwrap(), (-2.5f64).to_bits().to_be_bytes());
        assert!(parse(b"nope").is_err());
    }
}
