//! Entity descriptions and the schema that holds them.

use super::property::{Attribute, Property, Relationship};
use crate::backend::SchemaAdaptor;
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, PersistentTypeId, RecordType};
use std::collections::BTreeMap;

/// Backend-neutral description of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) parent: Option<EntityId>,
    pub(crate) subentities: Vec<EntityId>,
    pub(crate) persistent_type_id: PersistentTypeId,
    pub(crate) own_properties: Vec<Property>,
    pub(crate) properties: Vec<Property>,
}

impl Entity {
    /// Entity name.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Parent entity, if this entity inherits from one.
    #[must_use]
    pub fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }

    /// Direct subentities.
    #[must_use]
    pub fn subentities(&self) -> &[EntityId] {
        &self.subentities
    }

    /// Identity token that survives renames of the declaring type.
    #[must_use]
    pub fn persistent_type_id(&self) -> PersistentTypeId {
        self.persistent_type_id
    }

    /// Properties declared on this entity only.
    #[must_use]
    pub fn own_properties(&self) -> &[Property] {
        &self.own_properties
    }

    /// Inherited properties followed by own properties.
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Looks up a property by declared name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name() == name)
    }

    /// Looks up a property by storage key.
    #[must_use]
    pub fn property_for_storage_key(&self, key: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|property| property.storage_key() == key)
    }

    /// Looks up an attribute by declared name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.property(name).and_then(Property::as_attribute)
    }

    /// Looks up a relationship by declared name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.property(name).and_then(Property::as_relationship)
    }

    /// All attributes, inherited first.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.properties.iter().filter_map(Property::as_attribute)
    }

    /// All relationships, inherited first.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.properties.iter().filter_map(Property::as_relationship)
    }

    /// The single guaranteed-unique attribute, if any.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousPrimaryKey` if more than one attribute carries the
    /// trait. One is never picked arbitrarily.
    pub fn primary_key(&self) -> CoreResult<Option<&Attribute>> {
        let mut unique = self.attributes().filter(|attribute| attribute.is_guaranteed_unique());
        let first = unique.next();
        match unique.next() {
            None => Ok(first),
            Some(_) => Err(CoreError::AmbiguousPrimaryKey {
                entity: self.id.to_string(),
                attributes: self
                    .attributes()
                    .filter(|attribute| attribute.is_guaranteed_unique())
                    .map(|attribute| attribute.name.clone())
                    .collect(),
            }),
        }
    }
}

/// An immutable, ordered set of entities.
///
/// Parents always precede their subentities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    entities: Vec<Entity>,
    by_id: BTreeMap<EntityId, usize>,
    by_persistent_type: BTreeMap<PersistentTypeId, usize>,
}

impl Schema {
    pub(crate) fn from_entities(entities: Vec<Entity>) -> Self {
        let by_id = entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.id.clone(), index))
            .collect();
        let by_persistent_type = entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.persistent_type_id, index))
            .collect();
        Self {
            entities,
            by_id,
            by_persistent_type,
        }
    }

    /// All entities, parents before children.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the schema has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Looks up an entity by ID.
    #[must_use]
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.index_of(id).map(|index| &self.entities[index])
    }

    /// Looks up an entity by name.
    #[must_use]
    pub fn entity_named(&self, name: &str) -> Option<&Entity> {
        self.entity(&EntityId::new(name))
    }

    /// Looks up an entity by persistent type token.
    #[must_use]
    pub fn entity_for_persistent_type(&self, id: PersistentTypeId) -> Option<&Entity> {
        self.by_persistent_type
            .get(&id)
            .map(|&index| &self.entities[index])
    }

    /// Maps a backend record type to its entity through `adaptor`.
    #[must_use]
    pub fn entity_for_record_type(
        &self,
        adaptor: &dyn SchemaAdaptor,
        record_type: &RecordType,
    ) -> Option<&Entity> {
        adaptor
            .entity(record_type)
            .and_then(|id| self.entity(&id))
    }

    pub(crate) fn index_of(&self, id: &EntityId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn entity_at(&self, index: usize) -> &Entity {
        &self.entities[index]
    }

    /// Returns true if `id` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_kind_of(&self, id: &EntityId, ancestor: &EntityId) -> bool {
        let mut current = Some(id);
        while let Some(entity_id) = current {
            if entity_id == ancestor {
                return true;
            }
            current = self.entity(entity_id).and_then(Entity::parent);
        }
        false
    }

    /// `id` followed by all of its transitive subentities.
    #[must_use]
    pub fn entity_and_subentities(&self, id: &EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            if let Some(entity) = self.entity(&next) {
                pending.extend(entity.subentities.iter().rev().cloned());
                result.push(next);
            }
        }
        result
    }
}
