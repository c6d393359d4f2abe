//! Typed models over record proxies.
//!
//! A model is a thin wrapper around a [`RecordProxy`]. Its fields are
//! declared once, as an [`EntityDeclaration`], and exposed as typed
//! [`Field`] and [`RelationshipField`] constants carrying the same names.
//!
//! ```
//! use recordmap_core::{EntityDeclaration, Field, FieldDescriptor, Model, RecordProxy};
//!
//! pub struct Foo {
//!     proxy: RecordProxy,
//! }
//!
//! impl Foo {
//!     pub const BAR: Field<Foo, String> = Field::new("bar");
//! }
//!
//! impl Model for Foo {
//!     const ENTITY_NAME: &'static str = "Foo";
//!
//!     fn declaration() -> EntityDeclaration {
//!         EntityDeclaration::new(Self::ENTITY_NAME)
//!             .field(FieldDescriptor::of::<String>("bar").default_value("Untitled"))
//!     }
//!
//!     fn from_proxy(proxy: RecordProxy) -> Self {
//!         Self { proxy }
//!     }
//!
//!     fn proxy(&self) -> &RecordProxy {
//!         &self.proxy
//!     }
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use crate::proxy::{RecordProxy, RelationshipHandle};
use crate::query::{ComparisonOperator, Predicate, QueryTarget, SortDescriptor};
use crate::schema::EntityDeclaration;
use crate::transaction::Transaction;
use crate::types::{EntityId, RecordId};
use crate::value::AttributeValue;
use recordmap_codec::Value;
use std::fmt;
use std::marker::PhantomData;

/// A typed entity.
pub trait Model: Sized + Send + Sync + 'static {
    /// Entity name in the schema.
    const ENTITY_NAME: &'static str;

    /// Declaration of the entity's fields.
    fn declaration() -> EntityDeclaration;

    /// Wraps a proxy of a record of this entity.
    fn from_proxy(proxy: RecordProxy) -> Self;

    /// The underlying proxy.
    fn proxy(&self) -> &RecordProxy;

    /// Entity identifier.
    fn entity_id() -> EntityId {
        EntityId::new(Self::ENTITY_NAME)
    }

    /// Backend record ID.
    fn record_id(&self) -> RecordId {
        self.proxy().id()
    }
}

impl<M: Model> QueryTarget for M {
    fn target_entity() -> Option<EntityId> {
        Some(M::entity_id())
    }

    fn materialize(proxy: RecordProxy) -> Self {
        M::from_proxy(proxy)
    }
}

/// A record of any entity.
#[derive(Debug, Clone)]
pub struct AnyModel {
    proxy: RecordProxy,
}

impl AnyModel {
    /// The underlying proxy.
    #[must_use]
    pub fn proxy(&self) -> &RecordProxy {
        &self.proxy
    }

    /// Entity of the record.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        self.proxy.entity().id()
    }

    /// Converts into `M` if the record is an `M` or one of its subentities.
    pub fn cast<M: Model>(self) -> Result<M, Self> {
        let target = M::entity_id();
        if self.proxy.schema().is_kind_of(self.entity_id(), &target) {
            Ok(M::from_proxy(self.proxy))
        } else {
            Err(self)
        }
    }
}

impl QueryTarget for AnyModel {
    fn target_entity() -> Option<EntityId> {
        None
    }

    fn materialize(proxy: RecordProxy) -> Self {
        Self { proxy }
    }
}

/// Typed key path to an attribute of `M`.
pub struct Field<M, T> {
    name: &'static str,
    _marker: PhantomData<fn() -> (M, T)>,
}

impl<M, T> Field<M, T> {
    /// Creates a key path for the attribute declared as `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Declared attribute name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn compare(&self, op: ComparisonOperator, value: impl Into<Value>) -> Predicate {
        Predicate::compare(self.name, op, value)
    }

    /// `field == value`.
    #[must_use]
    pub fn equals(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::Equal, value)
    }

    /// `field != value`.
    #[must_use]
    pub fn not_equals(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::NotEqual, value)
    }

    /// `field < value`.
    #[must_use]
    pub fn less_than(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::Less, value)
    }

    /// `field <= value`.
    #[must_use]
    pub fn less_or_equal(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::LessOrEqual, value)
    }

    /// `field > value`.
    #[must_use]
    pub fn greater_than(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::Greater, value)
    }

    /// `field >= value`.
    #[must_use]
    pub fn greater_or_equal(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::GreaterOrEqual, value)
    }

    /// Substring or element match.
    #[must_use]
    pub fn contains(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOperator::Contains, value)
    }

    /// String prefix match.
    #[must_use]
    pub fn begins_with(&self, prefix: impl Into<String>) -> Predicate {
        self.compare(ComparisonOperator::BeginsWith, prefix.into())
    }

    /// The field is one of `values`.
    #[must_use]
    pub fn is_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.compare(ComparisonOperator::In, Value::Array(values))
    }

    /// The field holds no value.
    #[must_use]
    pub fn is_nil(&self) -> Predicate {
        self.compare(ComparisonOperator::Equal, Value::Null)
    }

    /// Ascending sort on the field.
    #[must_use]
    pub fn ascending(&self) -> SortDescriptor {
        SortDescriptor::ascending(self.name)
    }

    /// Descending sort on the field.
    #[must_use]
    pub fn descending(&self) -> SortDescriptor {
        SortDescriptor::descending(self.name)
    }
}

impl<M: Model, T: AttributeValue> Field<M, T> {
    /// Reads the field.
    pub fn get(&self, model: &M, txn: &Transaction) -> CoreResult<T> {
        model.proxy().decode(txn, self.name)
    }

    /// Writes the field.
    pub fn set(&self, model: &M, txn: &mut Transaction, value: T) -> CoreResult<()> {
        model.proxy().encode(txn, value, self.name)
    }
}

impl<M, T> Clone for Field<M, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, T> Copy for Field<M, T> {}

impl<M, T> fmt::Debug for Field<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Typed key path to a relationship from `M` to `D`.
pub struct RelationshipField<M, D> {
    name: &'static str,
    _marker: PhantomData<fn() -> (M, D)>,
}

impl<M, D> RelationshipField<M, D> {
    /// Creates a key path for the relationship declared as `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Declared relationship name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<M: Model, D: Model> RelationshipField<M, D> {
    /// Untyped handle on the relationship.
    pub fn handle(&self, model: &M, txn: &Transaction) -> CoreResult<RelationshipHandle> {
        model.proxy().relationship(txn, self.name)
    }

    /// All destinations.
    pub fn get(&self, model: &M, txn: &Transaction) -> CoreResult<Vec<D>> {
        txn.related::<D>(model.proxy(), self.name)
    }

    /// The single destination of a to-one relationship.
    pub fn one(&self, model: &M, txn: &Transaction) -> CoreResult<Option<D>> {
        Ok(self.get(model, txn)?.into_iter().next())
    }

    /// Adds `destination`. On a to-one relationship this replaces the
    /// current destination.
    pub fn insert(&self, model: &M, txn: &mut Transaction, destination: &D) -> CoreResult<()> {
        self.handle(model, txn)?.insert(txn, destination.proxy())
    }

    /// Removes `destination`.
    pub fn remove(&self, model: &M, txn: &mut Transaction, destination: &D) -> CoreResult<()> {
        self.handle(model, txn)?.remove(txn, destination.proxy())
    }

    /// Replaces every destination.
    pub fn set(&self, model: &M, txn: &mut Transaction, destinations: &[&D]) -> CoreResult<()> {
        let proxies: Vec<RecordProxy> = destinations
            .iter()
            .map(|destination| destination.proxy().clone())
            .collect();
        self.handle(model, txn)?.set(txn, &proxies)
    }

    /// Removes every destination.
    pub fn clear(&self, model: &M, txn: &mut Transaction) -> CoreResult<()> {
        self.handle(model, txn)?.set(txn, &[])
    }
}

impl<M, D> Clone for RelationshipField<M, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, D> Copy for RelationshipField<M, D> {}

impl<M, D> fmt::Debug for RelationshipField<M, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelationshipField").field(&self.name).finish()
    }
}

pub(crate) fn expect_kind_of<M: Model>(proxy: &RecordProxy) -> CoreResult<()> {
    let target = M::entity_id();
    if proxy.schema().is_kind_of(proxy.entity().id(), &target) {
        Ok(())
    } else {
        Err(CoreError::type_mismatch(
            proxy.id().to_string(),
            M::ENTITY_NAME,
            proxy.entity().id().as_str(),
        ))
    }
}
