//! # RecordMap Core
//!
//! Object-record mapping and transactions over pluggable record stores.
//!
//! This crate provides:
//! - A schema model built from explicit entity declarations
//! - Record proxies giving keyed, typed field access with a write-through cache
//! - Translation of typed queries into backend zone queries
//! - Transactions over private scratch spaces with two-phase commit
//! - Type erasure so the transaction layer works with any backend
//!
//! ## Layout
//!
//! Backends implement [`Database`] and [`RecordContext`]. The core wraps them
//! in [`AnyDatabase`] and [`AnyDatabaseRecordContext`], and a
//! [`DatabaseContainer`] pairs a database with its [`Schema`]. Work happens
//! in a [`Transaction`] obtained from a [`TransactionExecutor`]:
//!
//! ```ignore
//! let executor = container.executor(&[])?;
//! executor
//!     .execute(|txn| {
//!         let foo = txn.create::<Foo>()?;
//!         assert_eq!(Foo::BAR.get(&foo, txn)?, "Untitled");
//!         Ok(())
//!     })
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod container;
mod diff;
mod erased;
mod error;
mod model;
pub mod proxy;
pub mod query;
pub mod schema;
pub mod transaction;
mod types;
mod value;

pub use backend::{
    ContextState, DataUpdate, Database, DatabaseRecord, DatabaseState, IdentitySchemaAdaptor,
    MergeConflict, PrefixedSchemaAdaptor, RecordConfiguration, RecordContext, RecordUpdate,
    RecordUpdatePayload, RelationshipKind, RelationshipUpdate, SaveError, SchemaAdaptor,
};
pub use config::{Config, DatabaseConfiguration};
pub use container::DatabaseContainer;
pub use diff::IdentifierDiff;
pub use erased::{AnyDatabase, AnyDatabaseRecord, AnyDatabaseRecordContext, DatabaseTransaction};
pub use error::{BackendError, CoreError, CoreResult};
pub use model::{AnyModel, Field, Model, RelationshipField};
pub use proxy::{PrimaryKeyOrRecordId, RecordProxy, RelationshipHandle};
pub use query::{
    CancellationToken, ComparisonOperator, FetchLimit, Predicate, QueryCursor, QueryRequest,
    QueryScope, QueryTarget, QueryTranslator, SortDescriptor, ZonePredicate, ZoneQueryFilters,
    ZoneQueryRequest, ZoneQueryResult,
};
pub use schema::{
    Attribute, AttributeTrait, AttributeType, Cardinality, DeleteRule, Entity, EntityDeclaration,
    FieldDescriptor, FieldKind, PrimitiveType, Property, PropertyConfiguration, Relationship,
    Schema, SchemaBuilder, SchemaError, SchemaResult,
};
pub use transaction::{Page, Transaction, TransactionExecutor, TransactionMode, TransactionState};
pub use types::{EntityId, PersistentTypeId, RecordId, RecordType, TransactionId, Zone, ZoneId};
pub use value::{AttributeValue, Bytes, Codable, Date};

pub use recordmap_codec::Value;
