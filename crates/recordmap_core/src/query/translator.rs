//! Translation of typed queries into zone queries.

use super::predicate::SortDescriptor;
use super::request::{FetchLimit, QueryRequest, QueryTarget, ZoneQueryFilters, ZoneQueryRequest};
use crate::backend::SchemaAdaptor;
use crate::error::{CoreError, CoreResult};
use crate::schema::{Entity, Property, Schema};
use crate::types::{EntityId, RecordType};

/// Turns [`QueryRequest`]s into [`ZoneQueryRequest`]s for one schema and
/// backend.
#[derive(Debug, Clone, Copy)]
pub struct QueryTranslator<'a> {
    schema: &'a Schema,
    adaptor: &'a dyn SchemaAdaptor,
}

impl<'a> QueryTranslator<'a> {
    /// Creates a translator.
    #[must_use]
    pub fn new(schema: &'a Schema, adaptor: &'a dyn SchemaAdaptor) -> Self {
        Self { schema, adaptor }
    }

    /// Translates `request`.
    ///
    /// # Errors
    ///
    /// - `UnknownEntityType` if the target model is not in the schema.
    /// - `UnknownProperty` if a predicate or sort key names no property.
    /// - `UnsupportedPredicate` if a key names a relationship or a
    ///   transient attribute.
    pub fn translate<M: QueryTarget>(
        &self,
        request: &QueryRequest<M>,
    ) -> CoreResult<ZoneQueryRequest> {
        let entities = self.target_entities::<M>()?;

        let record_types: Vec<RecordType> = entities
            .iter()
            .map(|entity| self.adaptor.record_type(entity.id()))
            .collect();

        let mut resolve = |key: &str| self.storage_key(&entities, key);

        let predicate = request
            .predicate
            .as_ref()
            .map(|predicate| predicate.map_keys(&mut resolve))
            .transpose()?;

        let sort_descriptors = request
            .sort_descriptors
            .as_ref()
            .map(|descriptors| {
                descriptors
                    .iter()
                    .map(|descriptor| {
                        Ok(SortDescriptor {
                            key: resolve(&descriptor.key)?,
                            ascending: descriptor.ascending,
                        })
                    })
                    .collect::<CoreResult<Vec<_>>>()
            })
            .transpose()?;

        let (cursor, limit) = match request.fetch_limit {
            Some(FetchLimit::Count(count)) => (None, Some(count)),
            Some(FetchLimit::Cursor(cursor)) => (Some(cursor), None),
            None => (None, None),
        };

        let scope = request.scope.as_ref();
        let filters = ZoneQueryFilters {
            zones: scope
                .and_then(|scope| scope.zones.as_ref())
                .map(|zones| zones.iter().map(|zone| zone.id().clone()).collect()),
            record_ids: scope.and_then(|scope| scope.record_ids.clone()),
            record_types,
            includes_subentities: true,
        };

        Ok(ZoneQueryRequest {
            filters,
            predicate,
            sort_descriptors,
            cursor,
            limit,
        })
    }

    /// Maps a backend record type back to its entity.
    ///
    /// # Errors
    ///
    /// Returns `MissingSchemaEntry` if the adaptor maps the type to no
    /// entity of the schema.
    pub fn entity_for_record(&self, record_type: &RecordType) -> CoreResult<&'a Entity> {
        self.schema
            .entity_for_record_type(self.adaptor, record_type)
            .ok_or_else(|| CoreError::MissingSchemaEntry {
                record_type: record_type.to_string(),
            })
    }

    fn target_entities<M: QueryTarget>(&self) -> CoreResult<Vec<&'a Entity>> {
        match M::target_entity() {
            Some(id) => {
                if self.schema.entity(&id).is_none() {
                    return Err(CoreError::unknown_entity_type(id.as_str()));
                }
                Ok(self
                    .schema
                    .entity_and_subentities(&id)
                    .iter()
                    .filter_map(|id| self.schema.entity(id))
                    .collect())
            }
            None => Ok(self.schema.entities().iter().collect()),
        }
    }

    /// Subentities inherit the target's properties, so the first entity that
    /// declares `key` decides its storage key.
    fn storage_key(&self, entities: &[&Entity], key: &str) -> CoreResult<String> {
        let property = entities
            .iter()
            .find_map(|entity| entity.property(key))
            .ok_or_else(|| {
                let entity = entities
                    .first()
                    .map_or_else(|| EntityId::new("*"), |entity| entity.id().clone());
                CoreError::unknown_property(entity.as_str(), key)
            })?;

        match property {
            Property::Relationship(_) => Err(CoreError::unsupported_predicate(
                key,
                "relationships cannot be queried by value",
            )),
            Property::Attribute(attribute) if attribute.configuration.is_transient => Err(
                CoreError::unsupported_predicate(key, "transient attributes are not stored"),
            ),
            Property::Attribute(attribute) => Ok(attribute.storage_key().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IdentitySchemaAdaptor, PrefixedSchemaAdaptor};
    use crate::proxy::RecordProxy;
    use crate::query::{ComparisonOperator, Predicate, QueryCursor, ZonePredicate};
    use crate::schema::{EntityDeclaration, FieldDescriptor, SchemaBuilder};
    use crate::types::{RecordId, Zone};
    use recordmap_codec::Value;

    struct Shapes;
    struct Circles;
    struct Missing;

    macro_rules! target {
        ($ty:ty, $entity:expr) => {
            impl QueryTarget for $ty {
                fn target_entity() -> Option<EntityId> {
                    $entity
                }

                fn materialize(_proxy: RecordProxy) -> Self {
                    Self
                }
            }
        };
    }

    target!(Shapes, Some(EntityId::new("Shape")));
    target!(Circles, Some(EntityId::new("Circle")));
    target!(Missing, Some(EntityId::new("Hexagon")));

    fn schema() -> Schema {
        SchemaBuilder::new()
            .declare(
                EntityDeclaration::new("Shape")
                    .field(FieldDescriptor::of::<String>("name").renamed("shape_name"))
                    .field(FieldDescriptor::of::<i64>("sides"))
                    .field(FieldDescriptor::of::<i64>("scratch").transient())
                    .field(FieldDescriptor::to_one("canvas", "Canvas").inverse("shapes")),
            )
            .declare(
                EntityDeclaration::new("Circle")
                    .parent("Shape")
                    .field(FieldDescriptor::of::<f64>("radius")),
            )
            .declare(
                EntityDeclaration::new("Canvas")
                    .field(FieldDescriptor::to_many("shapes", "Shape").inverse("canvas")),
            )
            .finish()
            .unwrap()
    }

    #[test]
    fn empty_request_covers_entity_and_subentities() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);
        let zone = translator.translate(&QueryRequest::<Shapes>::new()).unwrap();

        assert_eq!(
            zone.filters.record_types,
            vec![RecordType::new("Shape"), RecordType::new("Circle")]
        );
        assert!(zone.filters.includes_subentities);
        assert!(zone.predicate.is_none());
        assert!(zone.sort_descriptors.is_none());
        assert!(zone.cursor.is_none());
        assert!(zone.limit.is_none());
    }

    #[test]
    fn translation_is_deterministic() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);
        let request = QueryRequest::<Circles>::new()
            .filter(Predicate::compare("radius", ComparisonOperator::Greater, 1.5))
            .limit(3);
        assert_eq!(
            translator.translate(&request).unwrap(),
            translator.translate(&request).unwrap()
        );
    }

    #[test]
    fn keys_map_to_storage_keys() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);
        let request = QueryRequest::<Circles>::new()
            .filter(Predicate::equal("name", "unit"))
            .sort(SortDescriptor::descending("radius"))
            .cursor(QueryCursor {
                offset: 4,
                page_size: 2,
            });

        let zone = translator.translate(&request).unwrap();
        assert_eq!(
            zone.predicate,
            Some(ZonePredicate::Compare {
                key: "shape_name".into(),
                op: ComparisonOperator::Equal,
                value: Value::from("unit"),
            })
        );
        assert_eq!(zone.sort_descriptors, Some(vec![SortDescriptor::descending("radius")]));
        assert_eq!(zone.filters.record_types, vec![RecordType::new("Circle")]);
        assert_eq!(zone.cursor, Some(QueryCursor { offset: 4, page_size: 2 }));
        assert_eq!(zone.limit, None);
    }

    #[test]
    fn scope_becomes_filters() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);
        let id = RecordId::new();
        let zone = Zone::named("archive");
        let request = QueryRequest::<Shapes>::new()
            .in_zones(vec![zone.clone()])
            .with_record_ids(vec![id]);

        let translated = translator.translate(&request).unwrap();
        assert_eq!(translated.filters.zones, Some(vec![zone.id().clone()]));
        assert_eq!(translated.filters.record_ids, Some(vec![id]));
    }

    #[test]
    fn relationship_and_transient_keys_are_rejected() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);

        let by_relationship = QueryRequest::<Shapes>::new().filter(Predicate::equal("canvas", 1));
        assert!(matches!(
            translator.translate(&by_relationship),
            Err(CoreError::UnsupportedPredicate { ref key, .. }) if key == "canvas"
        ));

        let by_transient = QueryRequest::<Shapes>::new().sort(SortDescriptor::ascending("scratch"));
        assert!(matches!(
            translator.translate(&by_transient),
            Err(CoreError::UnsupportedPredicate { .. })
        ));
    }

    #[test]
    fn unknown_keys_and_entities_fail() {
        let schema = schema();
        let translator = QueryTranslator::new(&schema, &IdentitySchemaAdaptor);

        let request = QueryRequest::<Shapes>::new().filter(Predicate::equal("colour", "red"));
        assert!(matches!(
            translator.translate(&request),
            Err(CoreError::UnknownProperty { ref key, .. }) if key == "colour"
        ));

        assert!(matches!(
            translator.translate(&QueryRequest::<Missing>::new()),
            Err(CoreError::UnknownEntityType { .. })
        ));
    }

    #[test]
    fn adaptor_prefixes_record_types() {
        let schema = schema();
        let adaptor = PrefixedSchemaAdaptor::cloud();
        let translator = QueryTranslator::new(&schema, &adaptor);

        let zone = translator.translate(&QueryRequest::<Circles>::new()).unwrap();
        assert_eq!(zone.filters.record_types, vec![RecordType::new("CD_Circle")]);

        assert_eq!(
            translator
                .entity_for_record(&RecordType::new("CD_Canvas"))
                .unwrap()
                .id()
                .as_str(),
            "Canvas"
        );
        assert!(matches!(
            translator.entity_for_record(&RecordType::new("Canvas")),
            Err(CoreError::MissingSchemaEntry { .. })
        ));
    }
}
