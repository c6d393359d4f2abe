//! Entity declarations consumed by the schema builder.
//!
//! A declaration is an explicit, ordered table of fields. Relationships
//! name their inverse by string, so the builder never has to discover it.

use super::property::PropertyConfiguration;
use super::types::{AttributeTrait, AttributeType, DeleteRule};
use crate::types::EntityId;
use crate::value::AttributeValue;
use recordmap_codec::Value;
use std::collections::BTreeSet;

/// Whether a field is an attribute or a relationship, with the details of
/// each.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Value-holding field.
    Attribute {
        /// Declared type.
        attribute_type: AttributeType,
        /// Value used when none is stored.
        default_value: Option<Value>,
        /// Attached traits.
        traits: BTreeSet<AttributeTrait>,
    },
    /// Link to other records.
    Relationship {
        /// Destination entity name.
        destination: EntityId,
        /// Name of the relationship on the destination that points back.
        inverse: Option<String>,
        /// Whether this side holds many destinations.
        to_many: bool,
        /// Whether a to-many relationship preserves order.
        ordered: bool,
        /// Delete rule.
        delete_rule: DeleteRule,
    },
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Declared name.
    pub name: String,
    /// Attribute or relationship details.
    pub kind: FieldKind,
    /// Optionality, transience and renaming.
    pub configuration: PropertyConfiguration,
}

impl FieldDescriptor {
    /// An attribute of the given type.
    #[must_use]
    pub fn attribute(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Attribute {
                attribute_type,
                default_value: None,
                traits: BTreeSet::new(),
            },
            configuration: PropertyConfiguration::default(),
        }
    }

    /// An attribute whose type (and optionality) is taken from `T`.
    #[must_use]
    pub fn of<T: AttributeValue>(name: impl Into<String>) -> Self {
        let mut field = Self::attribute(name, T::attribute_type());
        field.configuration.is_optional = T::is_optional();
        field
    }

    /// A to-one relationship.
    #[must_use]
    pub fn to_one(name: impl Into<String>, destination: impl Into<EntityId>) -> Self {
        Self::relationship(name, destination, false)
    }

    /// A to-many relationship.
    #[must_use]
    pub fn to_many(name: impl Into<String>, destination: impl Into<EntityId>) -> Self {
        Self::relationship(name, destination, true)
    }

    fn relationship(
        name: impl Into<String>,
        destination: impl Into<EntityId>,
        to_many: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relationship {
                destination: destination.into(),
                inverse: None,
                to_many,
                ordered: false,
                delete_rule: DeleteRule::default(),
            },
            configuration: PropertyConfiguration {
                // to-one relationships may always be empty
                is_optional: !to_many,
                ..PropertyConfiguration::default()
            },
        }
    }

    /// Marks the field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.configuration.is_optional = true;
        self
    }

    /// Marks the field transient.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.configuration.is_transient = true;
        self
    }

    /// Stores the field under `identifier` instead of its name.
    #[must_use]
    pub fn renamed(mut self, identifier: impl Into<String>) -> Self {
        self.configuration.renaming_identifier = Some(identifier.into());
        self
    }

    /// Sets the default value. Ignored on relationships.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        if let FieldKind::Attribute { default_value, .. } = &mut self.kind {
            *default_value = Some(value.into());
        }
        self
    }

    /// Adds a trait. Ignored on relationships.
    #[must_use]
    pub fn with_trait(mut self, attribute_trait: AttributeTrait) -> Self {
        if let FieldKind::Attribute { traits, .. } = &mut self.kind {
            traits.insert(attribute_trait);
        }
        self
    }

    /// Marks the attribute as the entity's primary key.
    #[must_use]
    pub fn unique(self) -> Self {
        self.with_trait(AttributeTrait::GuaranteedUnique)
    }

    /// Names the inverse relationship. Ignored on attributes.
    #[must_use]
    pub fn inverse(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::Relationship { inverse, .. } = &mut self.kind {
            *inverse = Some(name.into());
        }
        self
    }

    /// Preserves the order of a to-many relationship. Ignored on attributes.
    #[must_use]
    pub fn ordered(mut self) -> Self {
        if let FieldKind::Relationship { ordered, .. } = &mut self.kind {
            *ordered = true;
        }
        self
    }

    /// Sets the delete rule. Ignored on attributes.
    #[must_use]
    pub fn delete_rule(mut self, rule: DeleteRule) -> Self {
        if let FieldKind::Relationship { delete_rule, .. } = &mut self.kind {
            *delete_rule = rule;
        }
        self
    }

    /// Returns true if this is a relationship.
    #[must_use]
    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, FieldKind::Relationship { .. })
    }
}

/// Declaration of one entity: its name, parent and ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDeclaration {
    /// Entity name.
    pub name: String,
    /// Parent entity name.
    pub parent: Option<String>,
    /// Stable name used for the persistent type token, if it differs from
    /// `name`.
    pub renaming_identifier: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDeclaration {
    /// Starts a declaration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            renaming_identifier: None,
            fields: Vec::new(),
        }
    }

    /// Inherits from `parent`.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Keeps the persistent identity of a previous name.
    #[must_use]
    pub fn renamed(mut self, identifier: impl Into<String>) -> Self {
        self.renaming_identifier = Some(identifier.into());
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Name the persistent type token is derived from.
    #[must_use]
    pub fn stable_name(&self) -> &str {
        self.renaming_identifier.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PrimitiveType;

    #[test]
    fn typed_field_picks_up_optionality() {
        let field = FieldDescriptor::of::<Option<String>>("nickname");
        assert!(field.configuration.is_optional);
        assert_eq!(
            field.kind,
            FieldKind::Attribute {
                attribute_type: AttributeType::Primitive(PrimitiveType::String),
                default_value: None,
                traits: BTreeSet::new(),
            }
        );
    }

    #[test]
    fn relationship_modifiers() {
        let field = FieldDescriptor::to_many("books", "Book")
            .inverse("author")
            .ordered()
            .delete_rule(DeleteRule::Cascade)
            .default_value("ignored");
        match field.kind {
            FieldKind::Relationship {
                destination,
                inverse,
                to_many,
                ordered,
                delete_rule,
            } => {
                assert_eq!(destination.as_str(), "Book");
                assert_eq!(inverse.as_deref(), Some("author"));
                assert!(to_many);
                assert!(ordered);
                assert_eq!(delete_rule, DeleteRule::Cascade);
            }
            FieldKind::Attribute { .. } => panic!("expected relationship"),
        }
    }

    #[test]
    fn stable_name_prefers_renaming_identifier() {
        let declaration = EntityDeclaration::new("Novel").renamed("Book");
        assert_eq!(declaration.stable_name(), "Book");
        assert_eq!(EntityDeclaration::new("Book").stable_name(), "Book");
    }
}
