/// Value/Type Bridge
///
/// Conversions between the engine's dynamic column types and host values.
/// `ValueRef` borrows engine memory (zero-copy) and is only valid until the
/// statement is stepped again; `Value` owns its data.
use std::borrow::Cow;
use std::fmt;

use rusqlite::ffi;

/// Engine storage class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

impl ColumnType {
    pub(crate) fn from_code(code: i32) -> ColumnType {
        match code {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Null => "NULL",
        };
        f.write_str(name)
    }
}

/// A borrowed engine value.
///
/// Text is kept as raw bytes because the engine does not guarantee valid
/// UTF-8; use [`ValueRef::as_str`] or [`ValueRef::text_lossy`] to decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

impl<'a> ValueRef<'a> {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ValueRef::Null => ColumnType::Null,
            ValueRef::Integer(_) => ColumnType::Integer,
            ValueRef::Float(_) => ColumnType::Float,
            ValueRef::Text(_) => ColumnType::Text,
            ValueRef::Blob(_) => ColumnType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueRef::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ValueRef::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ValueRef::Float(f) => Some(f),
            ValueRef::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    /// Text as `&str`, if it is text and valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            ValueRef::Text(t) => std::str::from_utf8(t).ok(),
            _ => None,
        }
    }

    /// Text or blob contents.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            ValueRef::Text(b) | ValueRef::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Text decoded lossily; borrowed when already valid UTF-8.
    pub fn text_lossy(&self) -> Cow<'a, str> {
        match *self {
            ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t),
            ValueRef::Integer(i) => Cow::Owned(i.to_string()),
            ValueRef::Float(f) => Cow::Owned(f.to_string()),
            ValueRef::Null => Cow::Borrowed(""),
        }
    }

    /// Copies the value out of engine memory.
    pub fn to_value(&self) -> Value {
        match *self {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Float(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// An owned engine value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_ref(&self) -> ValueRef<'_> {
        ValueRef::from(self)
    }

    pub fn column_type(&self) -> ColumnType {
        self.as_ref().column_type()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl<'a> From<&'a Value> for ValueRef<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Float(f) => ValueRef::Float(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }
    }
}

impl<'a> From<ValueRef<'a>> for Value {
    fn from(value: ValueRef<'a>) -> Self {
        value.to_value()
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Integer(i64::from(v))
                }
            }

            impl<'a> From<$t> for ValueRef<'a> {
                fn from(v: $t) -> Self {
                    ValueRef::Integer(i64::from(v))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl<'a> From<f64> for ValueRef<'a> {
    fn from(v: f64) -> Self {
        ValueRef::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<'a> From<&'a str> for ValueRef<'a> {
    fn from(v: &'a str) -> Self {
        ValueRef::Text(v.as_bytes())
    }
}

impl<'a> From<&'a String> for ValueRef<'a> {
    fn from(v: &'a String) -> Self {
        ValueRef::Text(v.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for ValueRef<'a> {
    fn from(v: &'a [u8]) -> Self {
        ValueRef::Blob(v)
    }
}

impl<'a> From<&'a Vec<u8>> for ValueRef<'a> {
    fn from(v: &'a Vec<u8>) -> Self {
        ValueRef::Blob(v)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ValueRef<'a> {
    fn from(v: &'a [u8; N]) -> Self {
        ValueRef::Blob(v)
    }
}

impl<'a> From<Option<&'a str>> for ValueRef<'a> {
    fn from(v: Option<&'a str>) -> Self {
        v.map(ValueRef::from).unwrap_or(ValueRef::Null)
    }
}

impl<'a> From<Option<i64>> for ValueRef<'a> {
    fn from(v: Option<i64>) -> Self {
        v.map(ValueRef::Integer).unwrap_or(ValueRef::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_distinct_from_zero_and_empty() {
        assert_ne!(Value::Null, Value::Integer(0));
        assert_ne!(Value::Null, Value::Text(String::new()));
        assert_ne!(Value::Null, Value::Blob(Vec::new()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_value_ref_accessors() {
        let text = ValueRef::from("héllo");
        assert_eq!(text.column_type(), ColumnType::Text);
        assert_eq!(text.as_str(), Some("héllo"));
        assert_eq!(text.as_i64(), None);

        let invalid = ValueRef::Text(&[0x66, 0xff, 0x6f]);
        assert_eq!(invalid.as_str(), None);
        assert_eq!(invalid.text_lossy(), "f\u{fffd}o");

        assert_eq!(ValueRef::Integer(3).as_f64(), Some(3.0));
        assert!(ValueRef::Null.is_null());
    }

    #[test]
    fn test_owned_conversion_keeps_embedded_nul() {
        let value = ValueRef::Text(b"a\0b").to_value();
        assert_eq!(value, Value::Text("a\0b".to_string()));
        assert_eq!(value.as_ref().as_bytes().map(<[u8]>::len), Some(3));
    }

    #[test]
    fn test_column_type_names() {
        assert_eq!(ColumnType::Float.to_string(), "REAL");
        assert_eq!(Value::from(true).column_type(), ColumnType::Integer);
        assert_eq!(Value::from(vec![1u8, 2]).column_type(), ColumnType::Blob);
    }
}
