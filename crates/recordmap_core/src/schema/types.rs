//! Attribute types, traits, cardinalities and delete rules.

use recordmap_codec::Value;
use std::fmt;

/// Primitive attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Byte string.
    Bytes,
    /// Milliseconds since the Unix epoch, stored as an integer.
    Date,
    /// UUID, stored as 16 bytes.
    Uuid,
}

impl PrimitiveType {
    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Integer | Self::Date, Value::Integer(_))
            | (Self::Double, Value::Float(_) | Value::Integer(_))
            | (Self::String, Value::Text(_))
            | (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Uuid, Value::Bytes(bytes)) => bytes.len() == 16,
            _ => false,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Date => "date",
            Self::Uuid => "uuid",
        }
    }
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// A primitive value.
    Primitive(PrimitiveType),
    /// A homogeneous array.
    Array(Box<AttributeType>),
    /// A string-keyed dictionary with homogeneous values.
    Dictionary(Box<AttributeType>),
    /// An arbitrary serde-codable type, stored as CBOR bytes.
    Object {
        /// Rust type name of the stored object.
        type_name: String,
    },
}

impl AttributeType {
    /// Shorthand for a primitive type.
    #[must_use]
    pub const fn primitive(primitive: PrimitiveType) -> Self {
        Self::Primitive(primitive)
    }

    /// Shorthand for an array of `element`.
    #[must_use]
    pub fn array(element: AttributeType) -> Self {
        Self::Array(Box::new(element))
    }

    /// Shorthand for a dictionary of `element`.
    #[must_use]
    pub fn dictionary(element: AttributeType) -> Self {
        Self::Dictionary(Box::new(element))
    }

    /// Returns true if `value` is a valid non-null value of this type.
    #[must_use]
    pub fn validate(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Primitive(primitive), value) => primitive.accepts(value),
            (Self::Array(element), Value::Array(items)) => {
                items.iter().all(|item| element.validate(item))
            }
            (Self::Dictionary(element), Value::Map(pairs)) => pairs
                .iter()
                .all(|(key, value)| matches!(key, Value::Text(_)) && element.validate(value)),
            (Self::Object { .. }, Value::Bytes(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(primitive) => f.write_str(primitive.name()),
            Self::Array(element) => write!(f, "[{element}]"),
            Self::Dictionary(element) => write!(f, "[string: {element}]"),
            Self::Object { type_name } => write!(f, "object<{type_name}>"),
        }
    }
}

/// Optional behaviours attached to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeTrait {
    /// The attribute identifies its record; it is used as the primary key.
    GuaranteedUnique,
    /// The attribute discriminates between subentity types.
    TypeDiscriminator,
    /// Large values may be stored outside the record.
    AllowsExternalBinaryStorage,
}

/// Cardinality of a relationship, seen from its source side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// To-one on both sides.
    OneToOne,
    /// To-many here, to-one on the inverse.
    OneToMany,
    /// To-one here, to-many (or no) inverse.
    ManyToOne,
    /// To-many on both sides.
    ManyToMany,
}

impl Cardinality {
    /// Derives the cardinality from this side's arity and the inverse side's,
    /// if there is an inverse.
    #[must_use]
    pub const fn from_sides(to_many: bool, inverse_to_many: Option<bool>) -> Self {
        match (to_many, inverse_to_many) {
            (false, Some(false)) => Self::OneToOne,
            (false, Some(true) | None) => Self::ManyToOne,
            (true, Some(false) | None) => Self::OneToMany,
            (true, Some(true)) => Self::ManyToMany,
        }
    }

    /// Returns true if this side holds many destinations.
    #[must_use]
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// What happens to related records when a record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeleteRule {
    /// Remove the deleted record from the inverse relationship.
    #[default]
    Nullify,
    /// Delete the related records too.
    Cascade,
    /// Refuse the delete while related records exist.
    Deny,
    /// Leave related records untouched.
    NoAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_primitives() {
        let string = AttributeType::Primitive(PrimitiveType::String);
        assert!(string.validate(&Value::from("x")));
        assert!(!string.validate(&Value::Integer(1)));
        assert!(!string.validate(&Value::Null));

        let double = AttributeType::Primitive(PrimitiveType::Double);
        assert!(double.validate(&Value::Float(1.5)));
        assert!(double.validate(&Value::Integer(2)));

        let uuid = AttributeType::Primitive(PrimitiveType::Uuid);
        assert!(uuid.validate(&Value::Bytes(vec![0; 16])));
        assert!(!uuid.validate(&Value::Bytes(vec![0; 3])));
    }

    #[test]
    fn validate_collections() {
        let tags = AttributeType::array(AttributeType::Primitive(PrimitiveType::String));
        assert!(tags.validate(&Value::Array(vec![Value::from("a"), Value::from("b")])));
        assert!(!tags.validate(&Value::Array(vec![Value::from("a"), Value::Integer(1)])));

        let scores = AttributeType::dictionary(AttributeType::Primitive(PrimitiveType::Integer));
        assert!(scores.validate(&Value::text_map([("a", Value::Integer(1))])));
        assert!(!scores.validate(&Value::map(vec![(Value::Integer(1), Value::Integer(1))])));
    }

    #[test]
    fn cardinality_table() {
        assert_eq!(Cardinality::from_sides(false, Some(false)), Cardinality::OneToOne);
        assert_eq!(Cardinality::from_sides(false, Some(true)), Cardinality::ManyToOne);
        assert_eq!(Cardinality::from_sides(true, Some(false)), Cardinality::OneToMany);
        assert_eq!(Cardinality::from_sides(true, Some(true)), Cardinality::ManyToMany);
        assert_eq!(Cardinality::from_sides(false, None), Cardinality::ManyToOne);
        assert_eq!(Cardinality::from_sides(true, None), Cardinality::OneToMany);
    }

    #[test]
    fn display_names() {
        let ty = AttributeType::dictionary(AttributeType::array(AttributeType::Primitive(
            PrimitiveType::Date,
        )));
        assert_eq!(ty.to_string(), "[string: [date]]");
    }
}
