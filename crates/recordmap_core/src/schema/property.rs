//! Attribute and relationship descriptions.

use super::types::{AttributeTrait, AttributeType, Cardinality, DeleteRule};
use crate::backend::RelationshipKind;
use crate::types::EntityId;
use recordmap_codec::Value;
use std::collections::BTreeSet;

/// Configuration shared by attributes and relationships.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyConfiguration {
    /// The property may hold no value.
    pub is_optional: bool,
    /// The property lives only in memory and is never written to the backend.
    pub is_transient: bool,
    /// Name under which the property is stored, if it differs from its
    /// declared name.
    pub renaming_identifier: Option<String>,
}

impl PropertyConfiguration {
    fn storage_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.renaming_identifier.as_deref().unwrap_or(name)
    }
}

/// A value-holding property.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Declared name.
    pub name: String,
    /// Declared type.
    pub attribute_type: AttributeType,
    /// Value used when none is stored.
    pub default_value: Option<Value>,
    /// Attached traits.
    pub traits: BTreeSet<AttributeTrait>,
    /// Optionality, transience and renaming.
    pub configuration: PropertyConfiguration,
}

impl Attribute {
    /// Key under which the backend stores this attribute.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        self.configuration.storage_key(&self.name)
    }

    /// Returns true if the attribute carries `attribute_trait`.
    #[must_use]
    pub fn has_trait(&self, attribute_trait: AttributeTrait) -> bool {
        self.traits.contains(&attribute_trait)
    }

    /// Returns true if the attribute is the entity's primary key.
    #[must_use]
    pub fn is_guaranteed_unique(&self) -> bool {
        self.has_trait(AttributeTrait::GuaranteedUnique)
    }
}

/// A link from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Declared name.
    pub name: String,
    /// Entity at the other end.
    pub destination: EntityId,
    /// Name of the relationship on the destination that points back.
    pub inverse: Option<String>,
    /// Derived from both sides' arities.
    pub cardinality: Cardinality,
    /// What deleting the source does to destinations.
    pub delete_rule: DeleteRule,
    /// Whether a to-many relationship preserves order.
    pub is_ordered: bool,
    /// Optionality, transience and renaming.
    pub configuration: PropertyConfiguration,
}

impl Relationship {
    /// Key under which the backend stores this relationship.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        self.configuration.storage_key(&self.name)
    }

    /// Returns true if this side holds many destinations.
    #[must_use]
    pub const fn is_to_many(&self) -> bool {
        self.cardinality.is_to_many()
    }

    /// Backend shape of the relationship.
    #[must_use]
    pub const fn kind(&self) -> RelationshipKind {
        match (self.is_to_many(), self.is_ordered) {
            (false, _) => RelationshipKind::ToOne,
            (true, false) => RelationshipKind::ToUnorderedMany,
            (true, true) => RelationshipKind::ToOrderedMany,
        }
    }
}

/// A property of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// Value-holding property.
    Attribute(Attribute),
    /// Link to other records.
    Relationship(Relationship),
}

impl Property {
    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Attribute(attribute) => &attribute.name,
            Self::Relationship(relationship) => &relationship.name,
        }
    }

    /// Key under which the backend stores this property.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        match self {
            Self::Attribute(attribute) => attribute.storage_key(),
            Self::Relationship(relationship) => relationship.storage_key(),
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn configuration(&self) -> &PropertyConfiguration {
        match self {
            Self::Attribute(attribute) => &attribute.configuration,
            Self::Relationship(relationship) => &relationship.configuration,
        }
    }

    /// Returns the attribute, if this is one.
    #[must_use]
    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Self::Attribute(attribute) => Some(attribute),
            Self::Relationship(_) => None,
        }
    }

    /// Returns the relationship, if this is one.
    #[must_use]
    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Self::Attribute(_) => None,
            Self::Relationship(relationship) => Some(relationship),
        }
    }
}
