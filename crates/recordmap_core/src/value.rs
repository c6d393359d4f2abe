//! Conversions between Rust types and attribute values.

use crate::error::{CoreError, CoreResult};
use crate::schema::{AttributeType, PrimitiveType};
use recordmap_codec::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A Rust type that can be stored in an attribute.
///
/// The declared [`AttributeType`] is compared against the requested type on
/// every proxy read and write.
pub trait AttributeValue: Sized {
    /// Attribute type this Rust type maps to.
    fn attribute_type() -> AttributeType;

    /// Whether `Null` is a valid value of this type.
    fn is_optional() -> bool {
        false
    }

    /// Converts into a stored value.
    fn into_value(self) -> CoreResult<Value>;

    /// Converts back from a stored value. Returns `None` on a shape mismatch.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! primitive_attribute {
    ($ty:ty, $primitive:ident, $pattern:pat => $out:expr) => {
        impl AttributeValue for $ty {
            fn attribute_type() -> AttributeType {
                AttributeType::Primitive(PrimitiveType::$primitive)
            }

            fn into_value(self) -> CoreResult<Value> {
                Ok(Value::from(self))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    $pattern => $out,
                    _ => None,
                }
            }
        }
    };
}

primitive_attribute!(bool, Bool, Value::Bool(b) => Some(b));
primitive_attribute!(i64, Integer, Value::Integer(n) => Some(n));
primitive_attribute!(i32, Integer, Value::Integer(n) => i32::try_from(n).ok());
primitive_attribute!(String, String, Value::Text(s) => Some(s));

impl AttributeValue for f64 {
    fn attribute_type() -> AttributeType {
        AttributeType::Primitive(PrimitiveType::Double)
    }

    fn into_value(self) -> CoreResult<Value> {
        Ok(Value::Float(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_float()
    }
}

/// A byte-string attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Value::Bytes(bytes.0)
    }
}

primitive_attribute!(Bytes, Bytes, Value::Bytes(b) => Some(Bytes(b)));

/// A point in time with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(i64);

impl Date {
    /// Creates a date from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }
}

impl From<Date> for Value {
    fn from(date: Date) -> Self {
        Value::Integer(date.0)
    }
}

primitive_attribute!(Date, Date, Value::Integer(n) => Some(Date(n)));

impl AttributeValue for Uuid {
    fn attribute_type() -> AttributeType {
        AttributeType::Primitive(PrimitiveType::Uuid)
    }

    fn into_value(self) -> CoreResult<Value> {
        Ok(Value::Bytes(self.as_bytes().to_vec()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => Uuid::from_slice(&bytes).ok(),
            _ => None,
        }
    }
}

impl<T: AttributeValue> AttributeValue for Option<T> {
    fn attribute_type() -> AttributeType {
        T::attribute_type()
    }

    fn is_optional() -> bool {
        true
    }

    fn into_value(self) -> CoreResult<Value> {
        match self {
            Some(value) => value.into_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: AttributeValue> AttributeValue for Vec<T> {
    fn attribute_type() -> AttributeType {
        AttributeType::array(T::attribute_type())
    }

    fn into_value(self) -> CoreResult<Value> {
        self.into_iter()
            .map(AttributeValue::into_value)
            .collect::<CoreResult<Vec<_>>>()
            .map(Value::Array)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: AttributeValue> AttributeValue for BTreeMap<String, T> {
    fn attribute_type() -> AttributeType {
        AttributeType::dictionary(T::attribute_type())
    }

    fn into_value(self) -> CoreResult<Value> {
        let mut pairs = Vec::with_capacity(self.len());
        for (key, value) in self {
            pairs.push((key, value.into_value()?));
        }
        Ok(Value::text_map(pairs))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(pairs) => pairs
                .into_iter()
                .map(|(key, value)| match key {
                    Value::Text(key) => T::from_value(value).map(|value| (key, value)),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

/// Wraps any serde type so it can be stored as an object attribute.
///
/// The value is serialized with `ciborium` and stored as bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Codable<T>(pub T);

impl<T: Serialize + DeserializeOwned> AttributeValue for Codable<T> {
    fn attribute_type() -> AttributeType {
        AttributeType::Object {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    fn into_value(self) -> CoreResult<Value> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.0, &mut bytes).map_err(|e| CoreError::ObjectCoding {
            key: std::any::type_name::<T>().to_string(),
            message: e.to_string(),
        })?;
        Ok(Value::Bytes(bytes))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => ciborium::from_reader(bytes.as_slice()).ok().map(Codable),
            _ => None,
        }
    }
}
