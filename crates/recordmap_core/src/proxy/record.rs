//! Reflection-free access to the fields of one record.

use super::relationship::RelationshipHandle;
use crate::diff::IdentifierDiff;
use crate::erased::AnyDatabaseRecord;
use crate::error::{CoreError, CoreResult};
use crate::backend::{RecordUpdate, RelationshipKind, RelationshipUpdate};
use crate::schema::{Attribute, Entity, Property, Relationship, Schema};
use crate::transaction::Transaction;
use crate::types::{RecordId, TransactionId};
use crate::value::AttributeValue;
use parking_lot::Mutex;
use recordmap_codec::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The primary key of a record, or its record ID when the entity declares
/// none.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKeyOrRecordId {
    /// Value of the single guaranteed-unique attribute.
    PrimaryKey(Value),
    /// Backend record ID.
    RecordId(RecordId),
}

/// Values seen or written through a proxy, keyed by declared name.
///
/// `None` records that the key is known to hold no value.
#[derive(Debug, Default)]
struct ProxyCache {
    values: HashMap<String, Option<Value>>,
    relationships: HashMap<String, Vec<RecordId>>,
}

struct ProxyInner {
    record: AnyDatabaseRecord,
    entity_index: usize,
    schema: Arc<Schema>,
    transaction: TransactionId,
    cache: Mutex<ProxyCache>,
}

/// Typed access to one record inside one transaction.
///
/// All field access goes through string keys resolved against the schema.
/// Reads populate a per-proxy cache; writes update the cache and the
/// transaction's record space, so a read after a write returns the written
/// value without a backend round-trip.
///
/// Every operation takes the transaction explicitly and checks that it is
/// the one the proxy was created in. Clones share the cache.
#[derive(Clone)]
pub struct RecordProxy {
    inner: Arc<ProxyInner>,
}

impl RecordProxy {
    pub(crate) fn new(
        record: AnyDatabaseRecord,
        entity_index: usize,
        schema: Arc<Schema>,
        transaction: TransactionId,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                record,
                entity_index,
                schema,
                transaction,
                cache: Mutex::new(ProxyCache::default()),
            }),
        }
    }

    /// Backend record ID.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.inner.record.id()
    }

    /// The erased backend record.
    #[must_use]
    pub fn record(&self) -> &AnyDatabaseRecord {
        &self.inner.record
    }

    /// Entity of the record.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        self.inner.schema.entity_at(self.inner.entity_index)
    }

    /// Schema the entity belongs to.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Transaction the proxy is bound to.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.inner.transaction
    }

    /// Returns true if both handles refer to the same proxy.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reads attribute `key` as a `T`.
    ///
    /// # Errors
    ///
    /// - `UnknownProperty` if the entity has no such property.
    /// - `RelationshipCodingUnsupported` if `key` is a relationship.
    /// - `TypeMismatch` if `T` is not the declared type.
    /// - `MissingValue` if nothing is stored, no default is declared and the
    ///   attribute is not optional.
    pub fn decode<T: AttributeValue>(&self, txn: &Transaction, key: &str) -> CoreResult<T> {
        txn.check_access(self)?;
        let attribute = self.attribute(key)?;
        if txn.config().validate_attribute_types && !declared_matches::<T>(attribute) {
            return Err(CoreError::type_mismatch(
                key,
                attribute.attribute_type.to_string(),
                T::attribute_type().to_string(),
            ));
        }

        let value = self.resolved_value(txn, attribute)?;
        if value.is_null() && !T::is_optional() {
            return Err(CoreError::MissingValue {
                entity: self.entity().id().to_string(),
                key: key.to_string(),
            });
        }

        let found = value.kind_name();
        T::from_value(value).ok_or_else(|| {
            CoreError::type_mismatch(key, attribute.attribute_type.to_string(), found)
        })
    }

    /// Writes `value` to attribute `key`.
    ///
    /// # Errors
    ///
    /// Same lookup errors as [`decode`](Self::decode), plus
    /// `ReadOnlyTransaction`, and `TypeMismatch` when the value does not fit
    /// the declared type or is null for a required attribute.
    pub fn encode<T: AttributeValue>(
        &self,
        txn: &mut Transaction,
        value: T,
        key: &str,
    ) -> CoreResult<()> {
        txn.check_access(self)?;
        txn.check_writable()?;
        let attribute = self.attribute(key)?;
        if txn.config().validate_attribute_types && !declared_matches::<T>(attribute) {
            return Err(CoreError::type_mismatch(
                key,
                attribute.attribute_type.to_string(),
                T::attribute_type().to_string(),
            ));
        }
        let value = value.into_value()?;
        self.write_value(txn, attribute, value)
    }

    /// Writes an untyped value to attribute `key`, validating it against the
    /// declared type.
    pub fn set_value(&self, txn: &mut Transaction, key: &str, value: Value) -> CoreResult<()> {
        txn.check_access(self)?;
        txn.check_writable()?;
        let attribute = self.attribute(key)?;
        self.write_value(txn, attribute, value)
    }

    /// Reads attribute `key` untyped, with the same fallbacks as `decode`.
    /// Yields `Null` where `decode` would fail with `MissingValue`.
    pub fn value(&self, txn: &Transaction, key: &str) -> CoreResult<Value> {
        txn.check_access(self)?;
        let attribute = self.attribute(key)?;
        self.resolved_value(txn, attribute)
    }

    /// Returns true if `key` holds a stored value, or, for a relationship,
    /// at least one destination.
    pub fn contains_value(&self, txn: &Transaction, key: &str) -> CoreResult<bool> {
        txn.check_access(self)?;
        match self.property(key)? {
            Property::Attribute(attribute) => Ok(self
                .stored_value(txn, attribute)?
                .is_some_and(|value| !value.is_null())),
            Property::Relationship(relationship) => {
                Ok(!self.related_ids(txn, relationship)?.is_empty())
            }
        }
    }

    /// Removes the stored value of attribute `key`. Later reads fall back to
    /// the declared default.
    pub fn remove_value(&self, txn: &mut Transaction, key: &str) -> CoreResult<()> {
        txn.check_access(self)?;
        txn.check_writable()?;
        let attribute = self.attribute(key)?;
        if !attribute.configuration.is_transient {
            txn.space_update(self.record(), RecordUpdate::remove(attribute.storage_key()))?;
        }
        self.inner
            .cache
            .lock()
            .values
            .insert(attribute.name.clone(), None);
        Ok(())
    }

    /// Handle on relationship `key`.
    ///
    /// # Errors
    ///
    /// `UnknownProperty` if there is no such property, `TypeMismatch` if
    /// `key` names an attribute.
    pub fn relationship(&self, txn: &Transaction, key: &str) -> CoreResult<RelationshipHandle> {
        txn.check_access(self)?;
        match self.property(key)? {
            Property::Relationship(relationship) => {
                Ok(RelationshipHandle::new(self.clone(), relationship.clone()))
            }
            Property::Attribute(attribute) => Err(CoreError::type_mismatch(
                key,
                "relationship",
                attribute.attribute_type.to_string(),
            )),
        }
    }

    /// The record's primary key, or its record ID if the entity declares no
    /// guaranteed-unique attribute.
    ///
    /// # Errors
    ///
    /// `AmbiguousPrimaryKey` if more than one attribute is guaranteed
    /// unique.
    pub fn primary_key_or_record_id(&self, txn: &Transaction) -> CoreResult<PrimaryKeyOrRecordId> {
        txn.check_access(self)?;
        match self.entity().primary_key()? {
            Some(attribute) => Ok(PrimaryKeyOrRecordId::PrimaryKey(
                self.resolved_value(txn, attribute)?,
            )),
            None => Ok(PrimaryKeyOrRecordId::RecordId(self.id())),
        }
    }

    fn property(&self, key: &str) -> CoreResult<&Property> {
        self.entity()
            .property(key)
            .ok_or_else(|| CoreError::unknown_property(self.entity().id().as_str(), key))
    }

    fn attribute(&self, key: &str) -> CoreResult<&Attribute> {
        match self.property(key)? {
            Property::Attribute(attribute) => Ok(attribute),
            Property::Relationship(_) => Err(CoreError::RelationshipCodingUnsupported {
                key: key.to_string(),
            }),
        }
    }

    fn stored_value(&self, txn: &Transaction, attribute: &Attribute) -> CoreResult<Option<Value>> {
        if let Some(cached) = self.inner.cache.lock().values.get(&attribute.name) {
            return Ok(cached.clone());
        }
        let stored = if attribute.configuration.is_transient {
            None
        } else {
            txn.space_value(self.record(), attribute.storage_key())?
        };
        self.inner
            .cache
            .lock()
            .values
            .insert(attribute.name.clone(), stored.clone());
        Ok(stored)
    }

    fn resolved_value(&self, txn: &Transaction, attribute: &Attribute) -> CoreResult<Value> {
        Ok(match self.stored_value(txn, attribute)? {
            Some(value) => value,
            None => attribute.default_value.clone().unwrap_or(Value::Null),
        })
    }

    fn write_value(
        &self,
        txn: &mut Transaction,
        attribute: &Attribute,
        value: Value,
    ) -> CoreResult<()> {
        let key = &attribute.name;
        if value.is_null() {
            if !attribute.configuration.is_optional {
                return Err(CoreError::type_mismatch(
                    key.as_str(),
                    attribute.attribute_type.to_string(),
                    "null",
                ));
            }
        } else if !attribute.attribute_type.validate(&value) {
            return Err(CoreError::type_mismatch(
                key.as_str(),
                attribute.attribute_type.to_string(),
                value.kind_name(),
            ));
        }

        if !attribute.configuration.is_transient {
            txn.space_update(
                self.record(),
                RecordUpdate::set(attribute.storage_key(), value.clone()),
            )?;
        }
        self.inner.cache.lock().values.insert(key.clone(), Some(value));
        Ok(())
    }

    /// Current destinations of `relationship`.
    pub(crate) fn related_ids(
        &self,
        txn: &Transaction,
        relationship: &Relationship,
    ) -> CoreResult<Vec<RecordId>> {
        if let Some(cached) = self.inner.cache.lock().relationships.get(&relationship.name) {
            return Ok(cached.clone());
        }
        let ids = if relationship.configuration.is_transient {
            Vec::new()
        } else {
            txn.space_related(self.record(), relationship.storage_key())?
        };
        self.inner
            .cache
            .lock()
            .relationships
            .insert(relationship.name.clone(), ids.clone());
        Ok(ids)
    }

    /// Replaces the destinations of `relationship` without touching the
    /// inverse side.
    pub(crate) fn write_related(
        &self,
        txn: &mut Transaction,
        relationship: &Relationship,
        ids: Vec<RecordId>,
    ) -> CoreResult<()> {
        txn.check_writable()?;
        let current = self.related_ids(txn, relationship)?;
        if current == ids {
            return Ok(());
        }

        if !relationship.configuration.is_transient {
            let kind = relationship.kind();
            let update = match kind {
                RelationshipKind::ToOne => RelationshipUpdate::Set(ids.clone()),
                RelationshipKind::ToUnorderedMany | RelationshipKind::ToOrderedMany => {
                    IdentifierDiff::between(&current, &ids).map_or_else(
                        || RelationshipUpdate::Set(ids.clone()),
                        RelationshipUpdate::ApplyDiff,
                    )
                }
            };
            txn.space_update(
                self.record(),
                RecordUpdate::relationship(relationship.storage_key(), kind, update),
            )?;
        }

        self.inner
            .cache
            .lock()
            .relationships
            .insert(relationship.name.clone(), ids);
        Ok(())
    }

    pub(crate) fn clear_cache(&self) {
        let mut cache = self.inner.cache.lock();
        cache.values.clear();
        cache.relationships.clear();
    }
}

fn declared_matches<T: AttributeValue>(attribute: &Attribute) -> bool {
    attribute.attribute_type == T::attribute_type()
}

impl fmt::Debug for RecordProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordProxy")
            .field("entity", self.entity().id())
            .field("id", &self.id())
            .field("transaction", &self.inner.transaction)
            .finish()
    }
}
