//! Backend-neutral schema model and its builder.
//!
//! A [`Schema`] is built once from [`EntityDeclaration`]s and never mutated.
//! Replacing the declared entity set means building a new schema.

mod builder;
mod declaration;
mod entity;
mod error;
mod property;
mod types;

pub use builder::SchemaBuilder;
pub use declaration::{EntityDeclaration, FieldDescriptor, FieldKind};
pub use entity::{Entity, Schema};
pub use error::{SchemaError, SchemaResult};
pub use property::{Attribute, Property, PropertyConfiguration, Relationship};
pub use types::{AttributeTrait, AttributeType, Cardinality, DeleteRule, PrimitiveType};
