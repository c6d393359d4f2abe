//! Contracts every storage backend implements.
//!
//! The core never talks to a store directly. It drives a [`RecordContext`]
//! for record reads and writes, asks a [`Database`] for contexts and zones,
//! and maps entity names to backend record types through a
//! [`SchemaAdaptor`].

use crate::config::DatabaseConfiguration;
use crate::diff::IdentifierDiff;
use crate::error::{BackendError, CoreResult};
use crate::query::{CancellationToken, ZoneQueryRequest, ZoneQueryResult};
use crate::types::{EntityId, RecordId, RecordType, Zone, ZoneId};
use async_trait::async_trait;
use recordmap_codec::Value;
use std::fmt;
use std::sync::Arc;

/// A backend record handle.
pub trait DatabaseRecord: Clone + fmt::Debug + Send + Sync + 'static {
    /// Record identifier.
    fn id(&self) -> RecordId;

    /// Backend record type.
    fn record_type(&self) -> RecordType;

    /// Zone the record lives in.
    fn zone(&self) -> ZoneId;
}

/// Options for creating a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordConfiguration {
    /// Record type of the new record.
    pub record_type: Option<RecordType>,
    /// Explicit record ID. The backend allocates one when absent.
    pub record_id: Option<RecordId>,
    /// Target zone. The backend's default zone when absent.
    pub zone: Option<Zone>,
}

impl RecordConfiguration {
    /// Configuration for a record of `record_type`.
    #[must_use]
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type: Some(record_type),
            ..Self::default()
        }
    }

    /// Sets an explicit record ID.
    #[must_use]
    pub fn record_id(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Sets the target zone.
    #[must_use]
    pub fn zone(mut self, zone: Zone) -> Self {
        self.zone = Some(zone);
        self
    }
}

/// State of a record context.
///
/// `Clean -> Dirty` on any create, update or delete; `Dirty -> Saving` while
/// a save runs; `Saving -> Clean` on success or `Conflicted` on a merge
/// conflict. A conflicted context keeps its pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No pending changes.
    Clean,
    /// Pending changes not yet saved.
    Dirty,
    /// A save is in progress.
    Saving,
    /// The last save hit merge conflicts.
    Conflicted,
}

/// State of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    /// Open and usable.
    Ready,
    /// Open, but refuses writes.
    ReadOnly,
    /// Nothing attached.
    Unavailable,
}

/// Change to a plain attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum DataUpdate {
    /// Store a value.
    Set(Value),
    /// Remove the stored value.
    Remove,
}

/// Backend shape of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// At most one destination.
    ToOne,
    /// Many destinations, order irrelevant.
    ToUnorderedMany,
    /// Many destinations, order preserved.
    ToOrderedMany,
}

/// Change to a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipUpdate {
    /// Replace the destinations.
    Set(Vec<RecordId>),
    /// Apply a diff against the current destinations.
    ApplyDiff(IdentifierDiff),
}

/// What a [`RecordUpdate`] changes.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdatePayload {
    /// Attribute change.
    Data(DataUpdate),
    /// Relationship change.
    Relationship {
        /// Shape of the relationship.
        kind: RelationshipKind,
        /// The change.
        update: RelationshipUpdate,
    },
}

/// A single pending change to one key of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    /// Storage key.
    pub key: String,
    /// The change.
    pub payload: RecordUpdatePayload,
}

impl RecordUpdate {
    /// Sets an attribute.
    #[must_use]
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            payload: RecordUpdatePayload::Data(DataUpdate::Set(value)),
        }
    }

    /// Removes an attribute.
    #[must_use]
    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: RecordUpdatePayload::Data(DataUpdate::Remove),
        }
    }

    /// Changes a relationship.
    #[must_use]
    pub fn relationship(
        key: impl Into<String>,
        kind: RelationshipKind,
        update: RelationshipUpdate,
    ) -> Self {
        Self {
            key: key.into(),
            payload: RecordUpdatePayload::Relationship { kind, update },
        }
    }
}

/// A record that was modified concurrently by another writer.
#[derive(Debug, Clone)]
pub struct MergeConflict<R> {
    /// The conflicting record.
    pub source: R,
}

/// Why a save failed.
#[derive(Debug)]
pub enum SaveError<R> {
    /// Every record that conflicted. Nothing was applied.
    MergeConflicts(Vec<MergeConflict<R>>),
    /// The backend failed for another reason.
    Failed(BackendError),
}

impl<R> SaveError<R> {
    /// Converts the records carried by the conflicts.
    pub fn map_records<S>(self, mut f: impl FnMut(R) -> S) -> SaveError<S> {
        match self {
            Self::MergeConflicts(conflicts) => SaveError::MergeConflicts(
                conflicts
                    .into_iter()
                    .map(|conflict| MergeConflict {
                        source: f(conflict.source),
                    })
                    .collect(),
            ),
            Self::Failed(error) => SaveError::Failed(error),
        }
    }

    /// Returns the conflicts, or an empty slice for other failures.
    #[must_use]
    pub fn conflicts(&self) -> &[MergeConflict<R>] {
        match self {
            Self::MergeConflicts(conflicts) => conflicts,
            Self::Failed(_) => &[],
        }
    }
}

impl<R> fmt::Display for SaveError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MergeConflicts(conflicts) => {
                write!(f, "{} merge conflict(s)", conflicts.len())
            }
            Self::Failed(error) => write!(f, "{error}"),
        }
    }
}

impl<R: fmt::Debug> std::error::Error for SaveError<R> {}

/// A backend scratchpad of pending record mutations.
///
/// Contexts are shared behind `Arc` and use interior mutability. Deletes are
/// visible to later reads in the same context before `save`.
#[async_trait]
pub trait RecordContext: Send + Sync + 'static {
    /// The backend's record handle.
    type Record: DatabaseRecord;

    /// Current state.
    fn state(&self) -> ContextState;

    /// Creates a record.
    fn create_record(&self, configuration: RecordConfiguration) -> CoreResult<Self::Record>;

    /// Looks up a record. Deleted records are not returned.
    fn record(&self, id: RecordId) -> CoreResult<Option<Self::Record>>;

    /// Reads an attribute by storage key.
    fn value(&self, record: &Self::Record, key: &str) -> CoreResult<Option<Value>>;

    /// Reads relationship destinations by storage key.
    fn related(&self, record: &Self::Record, key: &str) -> CoreResult<Vec<RecordId>>;

    /// Applies an update to a record.
    fn update_record(&self, record: &Self::Record, update: RecordUpdate) -> CoreResult<()>;

    /// Marks a record for deletion.
    fn delete(&self, record: &Self::Record) -> CoreResult<()>;

    /// Runs a zone query against the context's current view.
    fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<Self::Record>>;

    /// Runs a zone query, checking `cancellation` before and after the
    /// backend work.
    async fn execute(
        &self,
        request: ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<Self::Record>> {
        cancellation.check()?;
        let result = self.execute_synchronously(&request)?;
        cancellation.check()?;
        Ok(result)
    }

    /// Commits all pending changes atomically.
    fn save_synchronously(&self) -> Result<(), SaveError<Self::Record>>;

    /// Commits all pending changes atomically.
    async fn save(&self) -> Result<(), SaveError<Self::Record>> {
        self.save_synchronously()
    }

    /// Drops all pending changes.
    fn discard_changes(&self);

    /// Marks the start of a unit of work.
    ///
    /// Backends that check versions on save forget what earlier reads
    /// observed for records with no pending change, so the next read
    /// observes them afresh.
    fn begin_work(&self) {}
}

/// A storage backend instance.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// The backend's record context.
    type Context: RecordContext;

    /// Database description.
    fn configuration(&self) -> &DatabaseConfiguration;

    /// Current state.
    fn state(&self) -> DatabaseState;

    /// Maps entities to this backend's record types.
    fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor>;

    /// Lists every zone.
    async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>>;

    /// Looks up a zone by name.
    async fn fetch_zone(&self, name: &str) -> CoreResult<Option<Zone>>;

    /// Opens a record context over `zones`, or over every zone if empty.
    fn record_context(&self, zones: &[Zone]) -> CoreResult<Arc<Self::Context>>;

    /// Erases all data.
    async fn delete(&self) -> CoreResult<()>;
}

/// Translates between entity names and backend record types.
pub trait SchemaAdaptor: fmt::Debug + Send + Sync {
    /// Record type for an entity.
    fn record_type(&self, entity: &EntityId) -> RecordType;

    /// Entity for a record type, if it maps to one.
    fn entity(&self, record_type: &RecordType) -> Option<EntityId>;
}

/// Record types are entity names.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySchemaAdaptor;

impl SchemaAdaptor for IdentitySchemaAdaptor {
    fn record_type(&self, entity: &EntityId) -> RecordType {
        RecordType::new(entity.as_str())
    }

    fn entity(&self, record_type: &RecordType) -> Option<EntityId> {
        Some(EntityId::new(record_type.as_str()))
    }
}

/// Record types are entity names with a fixed prefix.
#[derive(Debug, Clone)]
pub struct PrefixedSchemaAdaptor {
    prefix: String,
}

impl PrefixedSchemaAdaptor {
    /// Prefix used by cloud-style stores.
    pub const CLOUD_PREFIX: &'static str = "CD_";

    /// Creates an adaptor with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Creates an adaptor with the cloud-style `CD_` prefix.
    #[must_use]
    pub fn cloud() -> Self {
        Self::new(Self::CLOUD_PREFIX)
    }

    /// The prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl SchemaAdaptor for PrefixedSchemaAdaptor {
    fn record_type(&self, entity: &EntityId) -> RecordType {
        RecordType::new(format!("{}{}", self.prefix, entity))
    }

    fn entity(&self, record_type: &RecordType) -> Option<EntityId> {
        record_type
            .as_str()
            .strip_prefix(self.prefix.as_str())
            .filter(|name| !name.is_empty())
            .map(EntityId::new)
    }
}
