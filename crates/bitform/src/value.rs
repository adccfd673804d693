//! Native representation of decoded field values.

use derive_more::From;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Decoded value of a field or a plain-data projection of a whole structure.
///
/// Leaves decode to the scalar variants; [`Value::List`] and [`Value::Map`] only appear in
/// projections of arrays and structures. [`Value::Null`] is what padding decodes to.
#[derive(Debug, Clone, PartialEq, From)]
pub enum Value {
    /// No value (padding)
    #[from(skip)]
    Null,
    /// Integer of any supported width and signedness
    #[from(i8, i16, i32, i64, i128, u8, u16, u32, u64)]
    Int(i128),
    /// Single-bit boolean
    #[from]
    Bool(bool),
    /// Fixed-length string or enum label
    #[from(&str, String)]
    Str(String),
    /// Array projection
    #[from(skip)]
    List(Vec<Value>),
    /// Structure projection
    #[from(skip)]
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Integer contents, if this is an integer
    #[inline]
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(int) => Some(*int),
            _ => None,
        }
    }

    /// Boolean contents, if this is a boolean
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(boolean) => Some(*boolean),
            _ => None,
        }
    }

    /// String contents, if this is a string or an enum label
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(string) => Some(string),
            _ => None,
        }
    }

    /// Short description of the value's shape, used in error messages
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "an integer",
            Self::Bool(_) => "a boolean",
            Self::Str(_) => "a string",
            Self::List(_) => "a list",
            Self::Map(_) => "a map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("-"),
            Self::Int(int) => write!(f, "{int}"),
            Self::Bool(boolean) => write!(f, "{boolean}"),
            Self::Str(string) => f.write_str(string),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (index, (name, item)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// Not derivable: the conversion is generic over the item type, so that lists of plain
// scalars (`vec![true, false]`) convert directly
impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    #[inline]
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(int) => {
                // Stay within the integer widths every JSON consumer accepts where possible
                if let Ok(int) = i64::try_from(*int) {
                    serializer.serialize_i64(int)
                } else if let Ok(int) = u64::try_from(*int) {
                    serializer.serialize_u64(int)
                } else {
                    serializer.serialize_i128(*int)
                }
            }
            Self::Bool(boolean) => serializer.serialize_bool(*boolean),
            Self::Str(string) => serializer.serialize_str(string),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (name, item) in entries {
                    map.serialize_entry(name, item)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(0xfb_u8), Value::Int(0xfb));
        assert_eq!(Value::from(-57_i64), Value::Int(-57));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("hello"), Value::Str("hello".to_string()));
        assert_eq!(
            Value::from(vec![true, false]),
            Value::List(vec![Value::Bool(true), Value::Bool(false)])
        );
    }

    #[test]
    fn json_rendering() {
        let value = Value::Map(BTreeMap::from([
            ("flag".to_string(), Value::Bool(true)),
            ("count".to_string(), Value::Int(90)),
            ("pad".to_string(), Value::Null),
        ]));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"count":90,"flag":true,"pad":null}"#
        );
    }
}
