use std::fmt;

bitflags::bitflags! {
    /// A set of JSON-like types observed for a field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FieldType: u64 {
        const STRING = 1 << 0;
        const INT64 = 1 << 1;
        const UINT64 = 1 << 2;
        const FLOAT64 = 1 << 3;
        const OBJECT = 1 << 4;
        const ARRAY = 1 << 5;
        const BOOLEAN = 1 << 6;
        const NULL = 1 << 7;
    }
}

impl FieldType {
    /// Key width for a field created with this type: zero for variable
    /// length keys, otherwise one more than the fixed key size.
    pub fn width(self) -> u16 {
        if self == FieldType::BOOLEAN {
            1 + 1
        } else if self == FieldType::NULL {
            1
        } else if self == FieldType::FLOAT64
            || self == FieldType::INT64
            || self == FieldType::UINT64
        {
            1 + 8
        } else {
            0
        }
    }
}

impl Default for FieldType {
    fn default() -> FieldType {
        FieldType::empty()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect();
        if names.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_widen_monotonically() {
        let mut t = FieldType::STRING;
        t |= FieldType::FLOAT64;
        assert!(t.contains(FieldType::STRING));
        assert!(t.contains(FieldType::FLOAT64));
        assert!(!t.contains(FieldType::NULL));
        assert!(!FieldType::STRING.contains(t));
        assert_eq!(t.bits(), 0b1001);
    }

    #[test]
    fn widths() {
        assert_eq!(FieldType::STRING.width(), 0);
        assert_eq!(FieldType::FLOAT64.width(), 9);
        assert_eq!(FieldType::INT64.width(), 9);
        assert_eq!(FieldType::BOOLEAN.width(), 2);
        assert_eq!(FieldType::NULL.width(), 1);
        assert_eq!((FieldType::STRING | FieldType::NULL).width(), 0);
    }

    #[test]
    fn display_lists_every_member() {
        assert_eq!(FieldType::default().to_string(), "unknown");
        assert_eq!(
            (FieldType::BOOLEAN | FieldType::STRING).to_string(),
            "string | boolean"
        );
        // bits written by a newer version are kept but not named
        assert_eq!(FieldType::from_bits_retain(1 << 40).to_string(), "unknown");
    }
}
