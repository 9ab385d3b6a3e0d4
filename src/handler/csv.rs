use crate::field_type::FieldType;
use crate::handler::jsonl::float_key;
use crate::handler::FieldOperation;
use crate::page_layout::ToByte;
use crate::pointer::{MemoryPointer, ReferencedValue};
use std::borrow::Cow;
use std::ops::Range;

/// Splits a record into the byte ranges of its fields. Quoted fields keep
/// their quotes.
pub fn split(record: &[u8]) -> Result<Vec<Range<usize>>, String> {
    let mut fields = Vec::new();
    let mut start = 0;
    loop {
        let mut end = start;
        if record.get(start) == Some(&b'"') {
            end += 1;
            loop {
                match record.get(end) {
                    Some(b'"') if record.get(end + 1) == Some(&b'"') => end += 2,
                    Some(b'"') => {
                        end += 1;
                        break;
                    }
                    Some(_) => end += 1,
                    None => return Err(format!("unterminated quote in field at {}", start)),
                }
            }
            if end < record.len() && record[end] != b',' {
                return Err(format!("unexpected character after quoted field at {}", end));
            }
        } else {
            while end < record.len() && record[end] != b',' {
                end += 1;
            }
        }
        fields.push(start..end);
        if end >= record.len() {
            return Ok(fields);
        }
        start = end + 1;
    }
}

/// Strips the quotes of a quoted field and collapses `""` escapes.
pub fn unquote(raw: &[u8]) -> Result<Cow<'_, str>, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("field is not utf-8: {}", e))?;
    match text.strip_prefix('"') {
        Some(inner) => {
            let inner = inner
                .strip_suffix('"')
                .ok_or_else(|| format!("unterminated quote in '{}'", text))?;
            Ok(Cow::Owned(inner.replace("\"\"", "\"")))
        }
        None => Ok(Cow::Borrowed(text)),
    }
}

/// Type of an unquoted field value.
pub fn infer(text: &str) -> FieldType {
    if text.is_empty() {
        return FieldType::NULL;
    }
    if text.parse::<f64>().map_or(false, f64::is_finite) {
        return FieldType::FLOAT64;
    }
    match text {
        "true" | "false" | "TRUE" | "FALSE" | "True" | "False" => FieldType::BOOLEAN,
        _ => FieldType::STRING,
    }
}

fn key_bytes(text: &str, field_type: FieldType) -> Vec<u8> {
    if field_type == FieldType::NULL {
        Vec::new()
    } else if field_type == FieldType::FLOAT64 {
        float_key(text.parse::<f64>().unwrap_or_default())
    } else if field_type == FieldType::BOOLEAN {
        vec![text.eq_ignore_ascii_case("true").to_byte()]
    } else {
        text.as_bytes().to_vec()
    }
}

/// Turns a raw field into its key bytes.
pub fn parse(raw: &[u8]) -> Result<Vec<u8>, String> {
    let text = unquote(raw)?;
    Ok(key_bytes(&text, infer(&text)))
}

pub fn header(record: &[u8]) -> Result<Vec<String>, String> {
    split(record)?
        .into_iter()
        .map(|span| unquote(&record[span]).map(Cow::into_owned))
        .collect()
}

/// Collects the field operations of one data row starting at `base`.
pub fn operations(
    record: &[u8],
    base: u64,
    headers: &[String],
) -> Result<Vec<FieldOperation>, String> {
    let fields = split(record)?;
    if fields.len() != headers.len() {
        return Err(format!(
            "record has {} fields but the header names {}",
            fields.len(),
            headers.len()
        ));
    }

    let mut ops = Vec::with_capacity(fields.len());
    for (name, span) in headers.iter().zip(fields) {
        let text = unquote(&record[span.clone()])?;
        let field_type = infer(&text);
        let key = ReferencedValue::new(
            MemoryPointer::new(base + span.start as u64, span.len() as u32),
            key_bytes(&text, field_type),
        );
        ops.push(FieldOperation::insert(name.clone(), field_type, key));
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(record: &str) -> Vec<&str> {
        split(record.as_bytes())
            .unwrap()
            .into_iter()
            .map(|span| &record[span])
            .collect()
    }

    #[test]
    fn splits_on_commas() {
        assert_eq!(fields("a,b,,c"), vec!["a", "b", "", "c"]);
        assert_eq!(fields("a,"), vec!["a", ""]);
        assert_eq!(fields(""), vec![""]);
    }

    #[test]
    fn quoted_fields_may_hold_commas_and_quotes() {
        assert_eq!(fields(r#""a,b","say ""hi""",c"#), vec![r#""a,b""#, r#""say ""hi""""#, "c"]);
        assert_eq!(unquote(br#""say ""hi""""#).unwrap(), r#"say "hi""#);
        assert!(split(br#""open"#).is_err());
        assert!(split(br#""a"b,c"#).is_err());
    }

    #[test]
    fn infers_types() {
        assert_eq!(infer(""), FieldType::NULL);
        assert_eq!(infer("12"), FieldType::FLOAT64);
        assert_eq!(infer("-1.5e3"), FieldType::FLOAT64);
        assert_eq!(infer("True"), FieldType::BOOLEAN);
        assert_eq!(infer("NaN"), FieldType::STRING);
        assert_eq!(infer("test1"), FieldType::STRING);
    }

    #[test]
    fn rows_become_typed_operations() {
        let headers = header(b"name,\"age\",alive,note").unwrap();
        assert_eq!(headers, vec!["name", "age", "alive", "note"]);

        let ops = operations(b"bob,42,false,", 10, &headers).unwrap();
        let types: Vec<FieldType> = ops.iter().map(|op| op.field_type).collect();
        assert_eq!(
            types,
            vec![FieldType::STRING, FieldType::FLOAT64, FieldType::BOOLEAN, FieldType::NULL]
        );
        let name = ops[0].key.as_ref().unwrap();
        assert_eq!(name.value, b"bob");
        assert_eq!(name.data_pointer, MemoryPointer::new(10, 3));
        assert_eq!(ops[1].key.as_ref().unwrap().value, 42f64.to_bits().to_be_bytes());
        assert_eq!(ops[2].key.as_ref().unwrap().value, vec![0]);
        assert_eq!(ops[3].key.as_ref().unwrap().data_pointer, MemoryPointer::new(23, 0));
    }

    #[test]
    fn field_count_must_match_the_header() {
        let headers = vec!["a".to_string(), "b".to_string()];
        assert!(operations(b"1,2,3", 0, &headers).is_err());
        assert!(operations(b"1", 0, &headers).is_err());
        assert_eq!(operations(b"1,", 0, &headers).unwrap().len(), 2);
    }

    #[test]
    fn parse_matches_operations() {
        assert_eq!(parse(br#""x""""#).unwrap(), b"x\"");
        assert_eq!(parse(b"1").unwrap(), 1f64.to_bits().to_be_bytes());
        assert!(parse(b"").unwrap().is_empty());
    }
}
