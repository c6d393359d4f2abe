//! Schema construction errors.

use thiserror::Error;

/// Result type for schema construction.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building a [`super::Schema`] from declarations.
///
/// All of these are fatal to schema construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two declarations share a name.
    #[error("duplicate entity name: {name}")]
    DuplicateEntityName {
        /// The duplicated name.
        name: String,
    },

    /// A declared inverse does not name a matching relationship on the
    /// destination entity.
    #[error("relationship {entity}.{relationship} declares unresolved inverse '{inverse}'")]
    UnresolvedInverseRelationship {
        /// Source entity.
        entity: String,
        /// Relationship on the source entity.
        relationship: String,
        /// Declared inverse name.
        inverse: String,
    },

    /// The parent chain of an entity loops back on itself.
    #[error("cyclic inheritance involving {entity}")]
    CyclicInheritance {
        /// An entity on the cycle.
        entity: String,
    },

    /// A parent entity was named but never declared.
    #[error("entity {entity} has unknown parent {parent}")]
    UnknownParentEntity {
        /// Child entity.
        entity: String,
        /// Missing parent.
        parent: String,
    },

    /// A relationship points at an entity that was never declared.
    #[error("relationship {entity}.{relationship} points at unknown entity {destination}")]
    UnknownDestinationEntity {
        /// Source entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Missing destination.
        destination: String,
    },

    /// A property name appears twice along an inheritance chain.
    #[error("property '{property}' is declared more than once in {entity}'s inheritance chain")]
    DuplicatePropertyName {
        /// Entity declaring the duplicate.
        entity: String,
        /// Duplicated property name.
        property: String,
    },

    /// A default value does not match its attribute's type.
    #[error("default value of {entity}.{attribute} does not match its declared type")]
    InvalidDefaultValue {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },
}
