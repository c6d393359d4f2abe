//! Builds a [`Schema`] from entity declarations.

use super::declaration::{EntityDeclaration, FieldDescriptor, FieldKind};
use super::entity::{Entity, Schema};
use super::error::{SchemaError, SchemaResult};
use super::property::{Attribute, Property, Relationship};
use super::types::Cardinality;
use crate::model::Model;
use crate::types::{EntityId, PersistentTypeId};
use recordmap_codec::Value;
use std::collections::{HashMap, HashSet};

/// Collects entity declarations and turns them into a [`Schema`].
///
/// # Example
///
/// ```
/// use recordmap_core::{EntityDeclaration, FieldDescriptor, SchemaBuilder};
///
/// let schema = SchemaBuilder::new()
///     .declare(
///         EntityDeclaration::new("Foo")
///             .field(FieldDescriptor::of::<String>("bar").default_value("Untitled")),
///     )
///     .finish()
///     .unwrap();
/// assert!(schema.entity_named("Foo").unwrap().attribute("bar").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    declarations: Vec<EntityDeclaration>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declaration.
    #[must_use]
    pub fn declare(mut self, declaration: EntityDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Adds the declaration of model `M`.
    #[must_use]
    pub fn model<M: Model>(self) -> Self {
        self.declare(M::declaration())
    }

    /// Declarations collected so far.
    #[must_use]
    pub fn declarations(&self) -> &[EntityDeclaration] {
        &self.declarations
    }

    /// Builds the schema from the collected declarations.
    ///
    /// # Errors
    ///
    /// See [`SchemaBuilder::build`].
    pub fn finish(&self) -> SchemaResult<Schema> {
        Self::build(&self.declarations)
    }

    /// Builds a schema from `declarations`.
    ///
    /// Entities keep their declaration order except that parents are moved
    /// ahead of their subentities.
    ///
    /// # Errors
    ///
    /// Fails on duplicate entity or property names, unknown parents or
    /// destinations, cyclic inheritance, unresolved inverses and defaults
    /// that do not match their attribute type.
    pub fn build(declarations: &[EntityDeclaration]) -> SchemaResult<Schema> {
        let graph = DeclarationGraph::new(declarations)?;
        graph.check_property_names()?;

        let mut own_properties = Vec::with_capacity(declarations.len());
        for index in 0..declarations.len() {
            own_properties.push(graph.resolve_fields(index)?);
        }

        let order = graph.parent_first_order();
        let mut full_properties: HashMap<usize, Vec<Property>> = HashMap::new();
        let mut entities = Vec::with_capacity(order.len());
        for &index in &order {
            let declaration = &declarations[index];
            let mut properties = graph
                .parent_of(index)
                .and_then(|parent| full_properties.get(&parent).cloned())
                .unwrap_or_default();
            properties.extend(own_properties[index].iter().cloned());
            full_properties.insert(index, properties.clone());

            entities.push(Entity {
                id: EntityId::new(declaration.name.clone()),
                parent: declaration.parent.as_ref().map(EntityId::new),
                subentities: order
                    .iter()
                    .filter(|&&child| graph.parent_of(child) == Some(index))
                    .map(|&child| EntityId::new(declarations[child].name.clone()))
                    .collect(),
                persistent_type_id: PersistentTypeId::from_stable_name(declaration.stable_name()),
                own_properties: own_properties[index].clone(),
                properties,
            });
        }

        tracing::debug!(entities = entities.len(), "built schema");
        Ok(Schema::from_entities(entities))
    }
}

/// Index over the raw declarations, validated for unique names, known
/// parents and acyclic inheritance.
struct DeclarationGraph<'a> {
    declarations: &'a [EntityDeclaration],
    index: HashMap<&'a str, usize>,
}

impl<'a> DeclarationGraph<'a> {
    fn new(declarations: &'a [EntityDeclaration]) -> SchemaResult<Self> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (position, declaration) in declarations.iter().enumerate() {
            if index.insert(declaration.name.as_str(), position).is_some() {
                return Err(SchemaError::DuplicateEntityName {
                    name: declaration.name.clone(),
                });
            }
        }

        for declaration in declarations {
            if let Some(parent) = &declaration.parent {
                if !index.contains_key(parent.as_str()) {
                    return Err(SchemaError::UnknownParentEntity {
                        entity: declaration.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let graph = Self {
            declarations,
            index,
        };

        for start in 0..declarations.len() {
            let mut seen = HashSet::new();
            let mut current = Some(start);
            while let Some(position) = current {
                if !seen.insert(position) {
                    return Err(SchemaError::CyclicInheritance {
                        entity: declarations[start].name.clone(),
                    });
                }
                current = graph.parent_of(position);
            }
        }

        Ok(graph)
    }

    fn parent_of(&self, position: usize) -> Option<usize> {
        self.declarations[position]
            .parent
            .as_deref()
            .and_then(|parent| self.index.get(parent).copied())
    }

    /// `position` followed by its ancestors, nearest first.
    fn chain(&self, position: usize) -> Vec<usize> {
        let mut chain = vec![position];
        let mut current = self.parent_of(position);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parent_of(parent);
        }
        chain
    }

    fn is_kind_of(&self, position: usize, ancestor: usize) -> bool {
        self.chain(position).contains(&ancestor)
    }

    fn parent_first_order(&self) -> Vec<usize> {
        let mut placed = vec![false; self.declarations.len()];
        let mut order = Vec::with_capacity(self.declarations.len());
        for position in 0..self.declarations.len() {
            let mut pending = self.chain(position);
            while let Some(next) = pending.pop() {
                if !placed[next] {
                    placed[next] = true;
                    order.push(next);
                }
            }
        }
        order
    }

    fn check_property_names(&self) -> SchemaResult<()> {
        for position in 0..self.declarations.len() {
            let mut names = HashSet::new();
            for &member in self.chain(position).iter().rev() {
                for field in &self.declarations[member].fields {
                    if !names.insert(field.name.as_str()) {
                        return Err(SchemaError::DuplicatePropertyName {
                            entity: self.declarations[member].name.clone(),
                            property: field.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Finds a relationship field by name on `position` or its ancestors.
    fn find_relationship(&self, position: usize, name: &str) -> Option<&'a FieldDescriptor> {
        self.chain(position).into_iter().find_map(|member| {
            self.declarations[member]
                .fields
                .iter()
                .find(|field| field.name == name && field.is_relationship())
        })
    }

    fn resolve_fields(&self, position: usize) -> SchemaResult<Vec<Property>> {
        let declaration = &self.declarations[position];
        declaration
            .fields
            .iter()
            .map(|field| match &field.kind {
                FieldKind::Attribute {
                    attribute_type,
                    default_value,
                    traits,
                } => {
                    if let Some(default) = default_value {
                        let valid = match default {
                            Value::Null => field.configuration.is_optional,
                            value => attribute_type.validate(value),
                        };
                        if !valid {
                            return Err(SchemaError::InvalidDefaultValue {
                                entity: declaration.name.clone(),
                                attribute: field.name.clone(),
                            });
                        }
                    }
                    Ok(Property::Attribute(Attribute {
                        name: field.name.clone(),
                        attribute_type: attribute_type.clone(),
                        default_value: default_value.clone(),
                        traits: traits.clone(),
                        configuration: field.configuration.clone(),
                    }))
                }
                FieldKind::Relationship { .. } => self
                    .resolve_relationship(position, field)
                    .map(Property::Relationship),
            })
            .collect()
    }

    fn resolve_relationship(
        &self,
        position: usize,
        field: &FieldDescriptor,
    ) -> SchemaResult<Relationship> {
        let FieldKind::Relationship {
            destination,
            inverse,
            to_many,
            ordered,
            delete_rule,
        } = &field.kind
        else {
            unreachable!("resolve_relationship called on an attribute");
        };
        let entity = &self.declarations[position].name;

        let destination_position =
            self.lookup(destination.as_str())
                .ok_or_else(|| SchemaError::UnknownDestinationEntity {
                    entity: entity.clone(),
                    relationship: field.name.clone(),
                    destination: destination.to_string(),
                })?;

        let unresolved = |inverse: &str| SchemaError::UnresolvedInverseRelationship {
            entity: entity.clone(),
            relationship: field.name.clone(),
            inverse: inverse.to_string(),
        };

        let (inverse, inverse_to_many) = match inverse {
            Some(inverse_name) => {
                let inverse_field = self
                    .find_relationship(destination_position, inverse_name)
                    .ok_or_else(|| unresolved(inverse_name))?;
                let FieldKind::Relationship {
                    destination: back_destination,
                    inverse: back_inverse,
                    to_many: back_to_many,
                    ..
                } = &inverse_field.kind
                else {
                    return Err(unresolved(inverse_name));
                };
                let points_back = self
                    .lookup(back_destination.as_str())
                    .is_some_and(|back| self.is_kind_of(position, back));
                let names_us = back_inverse.as_deref().map_or(true, |back| back == field.name);
                if !points_back || !names_us {
                    return Err(unresolved(inverse_name));
                }
                (Some(inverse_name.clone()), Some(*back_to_many))
            }
            None => self
                .lazy_inverse(position, destination_position, &field.name)
                .map_or((None, None), |(name, to_many)| (Some(name), Some(to_many))),
        };

        Ok(Relationship {
            name: field.name.clone(),
            destination: destination.clone(),
            inverse,
            cardinality: Cardinality::from_sides(*to_many, inverse_to_many),
            delete_rule: *delete_rule,
            is_ordered: *ordered,
            configuration: field.configuration.clone(),
        })
    }

    /// Finds a relationship on the destination chain that names `name` as
    /// its inverse and points back at `position` or one of its ancestors.
    fn lazy_inverse(
        &self,
        position: usize,
        destination: usize,
        name: &str,
    ) -> Option<(String, bool)> {
        self.chain(destination).into_iter().find_map(|member| {
            self.declarations[member].fields.iter().find_map(|field| match &field.kind {
                FieldKind::Relationship {
                    destination,
                    inverse: Some(inverse),
                    to_many,
                    ..
                } if inverse == name
                    && self
                        .lookup(destination.as_str())
                        .is_some_and(|back| self.is_kind_of(position, back)) =>
                {
                    Some((field.name.clone(), *to_many))
                }
                _ => None,
            })
        })
    }
}
