//! The dynamic value every attribute is stored as.

use crate::encoder::to_canonical_cbor;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A dynamic attribute value.
///
/// Records store their attributes as `Value`s. Floats may be infinite but
/// never NaN, and are always persisted at 64-bit width. Map entries are kept
/// in canonical key order when built through [`Value::map`] or
/// [`Value::text_map`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value. Optional attributes read as `Null` when unset.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Integer(i64),
    /// A 64-bit float.
    Float(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// An ordered list.
    Array(Vec<Value>),
    /// Key/value entries.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// A map with its entries in canonical key order.
    #[must_use]
    pub fn map(mut entries: Vec<(Value, Value)>) -> Self {
        entries.sort_by(|(a, _), (b, _)| a.cmp_canonical(b));
        Value::Map(entries)
    }

    /// A map keyed by text, in canonical key order.
    pub fn text_map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::map(
            entries
                .into_iter()
                .map(|(key, value)| (Value::Text(key.into()), value))
                .collect(),
        )
    }

    /// Orders two values by their canonical encodings: shorter first, then
    /// bytewise. This is the map key order of the encoder.
    ///
    /// Values without an encoding (those holding NaN) fall back to
    /// [`Value::sort_cmp`].
    #[must_use]
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        match (to_canonical_cbor(self), to_canonical_cbor(other)) {
            (Ok(a), Ok(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(&b)),
            _ => self.sort_cmp(other),
        }
    }

    /// Compares values the way predicates do.
    ///
    /// Integers and floats compare numerically across kinds. Text, bytes
    /// and arrays compare lexicographically. Other pairs of kinds have no
    /// order.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use Value::{Array, Bool, Bytes, Float, Integer, Null, Text};
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Array(a), Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.compare(y))
                .find(|order| *order != Some(Ordering::Equal))
                .unwrap_or(Some(a.len().cmp(&b.len()))),
            _ => None,
        }
    }

    /// A total order for sorting results: nulls first, then [`compare`],
    /// with unrelated kinds ranked by kind.
    ///
    /// [`compare`]: Value::compare
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Bytes(_) => 3,
            Value::Text(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }

    /// Kind name for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// True for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(flag) = self {
            Some(*flag)
        } else {
            None
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The number as a float. Integers widen.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(float) => Some(float),
            Value::Integer(n) => Some(n as f64),
            _ => None,
        }
    }

    /// The bytes, if this is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// The text, if this is a text string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(text) = self {
            Some(text)
        } else {
            None
        }
    }

    /// The elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// The entries, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        if let Value::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Looks up a text key when this is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find_map(|(k, v)| (k.as_text() == Some(key)).then_some(v))
    }
}

macro_rules! value_from {
    ($($source:ty => |$v:ident| $convert:expr;)*) => {
        $(
            impl From<$source> for Value {
                fn from($v: $source) -> Self {
                    $convert
                }
            }
        )*
    };
}

value_from! {
    bool => |v| Value::Bool(v);
    i64 => |v| Value::Integer(v);
    i32 => |v| Value::Integer(i64::from(v));
    u32 => |v| Value::Integer(i64::from(v));
    f64 => |v| Value::Float(v);
    String => |v| Value::Text(v);
    &str => |v| Value::Text(v.to_owned());
    Vec<u8> => |v| Value::Bytes(v);
    &[u8] => |v| Value::Bytes(v.to_vec());
    BTreeMap<String, Value> => |v| Value::text_map(v);
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &Value) -> Vec<&str> {
        map.as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_text())
            .collect()
    }

    #[test]
    fn text_maps_sort_short_keys_first() {
        let record = Value::text_map([
            ("title", Value::from("Dune")),
            ("id", Value::from(1)),
            ("pages", Value::from(412)),
            ("author", Value::Null),
        ]);
        assert_eq!(keys(&record), ["id", "pages", "title", "author"]);
    }

    #[test]
    fn canonical_order_follows_encoding() {
        let mut values = vec![
            Value::from(-1),
            Value::from(500),
            Value::from(0),
            Value::from("a"),
            Value::from(24),
        ];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(
            values,
            [
                Value::from(0),
                Value::from(-1),
                Value::from(24),
                Value::from("a"),
                Value::from(500),
            ]
        );
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(Value::from(2).compare(&Value::from(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from(3.0).compare(&Value::from(3)), Some(Ordering::Equal));
        assert_eq!(Value::from("3").compare(&Value::from(3)), None);
        let short = Value::Array(vec![Value::from(1)]);
        let long = Value::Array(vec![Value::from(1), Value::Null]);
        assert_eq!(short.compare(&long), Some(Ordering::Less));
    }

    #[test]
    fn sorting_is_total() {
        let mut values = vec![
            Value::from("b"),
            Value::from(7),
            Value::Null,
            Value::from("a"),
            Value::from(true),
        ];
        values.sort_by(Value::sort_cmp);
        assert_eq!(
            values,
            [
                Value::Null,
                Value::from(true),
                Value::from(7),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn accessors_match_their_kind() {
        let text = Value::from("Emma");
        assert_eq!(text.as_text(), Some("Emma"));
        assert_eq!(text.as_integer(), None);
        assert_eq!(Value::from(4).as_float(), Some(4.0));
        assert_eq!(Value::from(&b"ab"[..]).as_bytes(), Some(&b"ab"[..]));
        assert_eq!(Value::Null.kind_name(), "null");
        assert!(Value::from(None::<String>).is_null());
    }

    #[test]
    fn get_reads_text_keys() {
        let record = Value::text_map([("pages", Value::from(320))]);
        assert_eq!(record.get("pages"), Some(&Value::Integer(320)));
        assert_eq!(record.get("title"), None);
        assert_eq!(Value::from(1).get("pages"), None);
    }
}
