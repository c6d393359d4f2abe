//! Type erasure for backends.
//!
//! The transaction layer works with any backend through three handles:
//! [`AnyDatabase`], [`AnyDatabaseRecordContext`] and [`AnyDatabaseRecord`].
//! Each wraps a trait object. Erased records are cast back to the backend's
//! record type once, at the boxing boundary; a record from another backend
//! fails with `ForeignRecord`.

use crate::backend::{
    ContextState, Database, DatabaseRecord, DatabaseState, IdentitySchemaAdaptor,
    RecordConfiguration, RecordContext, RecordUpdate, SaveError, SchemaAdaptor,
};
use crate::config::DatabaseConfiguration;
use crate::error::{CoreError, CoreResult};
use crate::query::{CancellationToken, ZoneQueryRequest, ZoneQueryResult};
use crate::types::{RecordId, RecordType, Zone, ZoneId};
use async_trait::async_trait;
use recordmap_codec::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

trait ErasedRecord: fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> RecordId;
    fn record_type(&self) -> RecordType;
    fn zone(&self) -> ZoneId;
    fn as_any(&self) -> &dyn Any;
}

impl<R: DatabaseRecord> ErasedRecord for R {
    fn id(&self) -> RecordId {
        DatabaseRecord::id(self)
    }

    fn record_type(&self) -> RecordType {
        DatabaseRecord::record_type(self)
    }

    fn zone(&self) -> ZoneId {
        DatabaseRecord::zone(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A record of any backend.
///
/// Two erased records are equal when their IDs are.
#[derive(Clone)]
pub struct AnyDatabaseRecord(Arc<dyn ErasedRecord>);

impl AnyDatabaseRecord {
    /// Erases a backend record. Erasing an erased record returns it as is.
    pub fn new<R: DatabaseRecord>(record: R) -> Self {
        if let Some(erased) = (&record as &dyn Any).downcast_ref::<Self>() {
            return erased.clone();
        }
        Self(Arc::new(record))
    }

    /// Record identifier.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.0.id()
    }

    /// Backend record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        self.0.record_type()
    }

    /// Zone the record lives in.
    #[must_use]
    pub fn zone(&self) -> ZoneId {
        self.0.zone()
    }

    /// Returns the backend record, if it is an `R`.
    #[must_use]
    pub fn downcast_ref<R: DatabaseRecord>(&self) -> Option<&R> {
        self.0.as_any().downcast_ref::<R>()
    }

    fn cast<R: DatabaseRecord>(&self) -> CoreResult<&R> {
        self.downcast_ref::<R>().ok_or(CoreError::ForeignRecord {
            expected: std::any::type_name::<R>(),
        })
    }
}

impl fmt::Debug for AnyDatabaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl PartialEq for AnyDatabaseRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyDatabaseRecord {}

impl Hash for AnyDatabaseRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl DatabaseRecord for AnyDatabaseRecord {
    fn id(&self) -> RecordId {
        self.0.id()
    }

    fn record_type(&self) -> RecordType {
        self.0.record_type()
    }

    fn zone(&self) -> ZoneId {
        self.0.zone()
    }
}

#[async_trait]
trait ErasedRecordContext: Send + Sync {
    fn state(&self) -> ContextState;
    fn create_record(&self, configuration: RecordConfiguration) -> CoreResult<AnyDatabaseRecord>;
    fn record(&self, id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>>;
    fn value(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Option<Value>>;
    fn related(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Vec<RecordId>>;
    fn update_record(&self, record: &AnyDatabaseRecord, update: RecordUpdate) -> CoreResult<()>;
    fn delete(&self, record: &AnyDatabaseRecord) -> CoreResult<()>;
    fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>>;
    async fn execute(
        &self,
        request: ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>>;
    fn save_synchronously(&self) -> Result<(), SaveError<AnyDatabaseRecord>>;
    async fn save(&self) -> Result<(), SaveError<AnyDatabaseRecord>>;
    fn discard_changes(&self);
    fn begin_work(&self);
}

struct RecordContextBox<C> {
    context: Arc<C>,
}

#[async_trait]
impl<C: RecordContext> ErasedRecordContext for RecordContextBox<C> {
    fn state(&self) -> ContextState {
        self.context.state()
    }

    fn create_record(&self, configuration: RecordConfiguration) -> CoreResult<AnyDatabaseRecord> {
        self.context
            .create_record(configuration)
            .map(AnyDatabaseRecord::new)
    }

    fn record(&self, id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>> {
        Ok(self.context.record(id)?.map(AnyDatabaseRecord::new))
    }

    fn value(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Option<Value>> {
        self.context.value(record.cast::<C::Record>()?, key)
    }

    fn related(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Vec<RecordId>> {
        self.context.related(record.cast::<C::Record>()?, key)
    }

    fn update_record(&self, record: &AnyDatabaseRecord, update: RecordUpdate) -> CoreResult<()> {
        self.context.update_record(record.cast::<C::Record>()?, update)
    }

    fn delete(&self, record: &AnyDatabaseRecord) -> CoreResult<()> {
        self.context.delete(record.cast::<C::Record>()?)
    }

    fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        Ok(self
            .context
            .execute_synchronously(request)?
            .map(AnyDatabaseRecord::new))
    }

    async fn execute(
        &self,
        request: ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        Ok(self
            .context
            .execute(request, cancellation)
            .await?
            .map(AnyDatabaseRecord::new))
    }

    fn save_synchronously(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        self.context
            .save_synchronously()
            .map_err(|error| error.map_records(AnyDatabaseRecord::new))
    }

    async fn save(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        self.context
            .save()
            .await
            .map_err(|error| error.map_records(AnyDatabaseRecord::new))
    }

    fn discard_changes(&self) {
        self.context.discard_changes();
    }

    fn begin_work(&self) {
        self.context.begin_work();
    }
}

struct InvalidRecordContext;

#[async_trait]
impl ErasedRecordContext for InvalidRecordContext {
    fn state(&self) -> ContextState {
        ContextState::Clean
    }

    fn create_record(&self, _configuration: RecordConfiguration) -> CoreResult<AnyDatabaseRecord> {
        Err(CoreError::Unavailable)
    }

    fn record(&self, _id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>> {
        Err(CoreError::Unavailable)
    }

    fn value(&self, _record: &AnyDatabaseRecord, _key: &str) -> CoreResult<Option<Value>> {
        Err(CoreError::Unavailable)
    }

    fn related(&self, _record: &AnyDatabaseRecord, _key: &str) -> CoreResult<Vec<RecordId>> {
        Err(CoreError::Unavailable)
    }

    fn update_record(&self, _record: &AnyDatabaseRecord, _update: RecordUpdate) -> CoreResult<()> {
        Err(CoreError::Unavailable)
    }

    fn delete(&self, _record: &AnyDatabaseRecord) -> CoreResult<()> {
        Err(CoreError::Unavailable)
    }

    fn execute_synchronously(
        &self,
        _request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        Err(CoreError::Unavailable)
    }

    async fn execute(
        &self,
        _request: ZoneQueryRequest,
        _cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        Err(CoreError::Unavailable)
    }

    fn save_synchronously(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        Err(SaveError::Failed(Box::new(CoreError::Unavailable)))
    }

    async fn save(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        Err(SaveError::Failed(Box::new(CoreError::Unavailable)))
    }

    fn discard_changes(&self) {}

    fn begin_work(&self) {}
}

/// A record context of any backend.
///
/// Clones share the same underlying context.
#[derive(Clone)]
pub struct AnyDatabaseRecordContext {
    inner: Arc<dyn ErasedRecordContext>,
}

impl AnyDatabaseRecordContext {
    /// Erases a backend record context.
    pub fn new<C: RecordContext>(context: Arc<C>) -> Self {
        Self {
            inner: Arc::new(RecordContextBox { context }),
        }
    }

    /// A context that fails every operation with `Unavailable`.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            inner: Arc::new(InvalidRecordContext),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.inner.state()
    }

    /// Creates a record.
    pub fn create_record(
        &self,
        configuration: RecordConfiguration,
    ) -> CoreResult<AnyDatabaseRecord> {
        self.inner.create_record(configuration)
    }

    /// Looks up a record.
    pub fn record(&self, id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>> {
        self.inner.record(id)
    }

    /// Reads an attribute by storage key.
    pub fn value(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Option<Value>> {
        self.inner.value(record, key)
    }

    /// Reads relationship destinations by storage key.
    pub fn related(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Vec<RecordId>> {
        self.inner.related(record, key)
    }

    /// Applies an update.
    pub fn update_record(
        &self,
        record: &AnyDatabaseRecord,
        update: RecordUpdate,
    ) -> CoreResult<()> {
        self.inner.update_record(record, update)
    }

    /// Marks a record for deletion.
    pub fn delete(&self, record: &AnyDatabaseRecord) -> CoreResult<()> {
        self.inner.delete(record)
    }

    /// Runs a zone query.
    pub fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        self.inner.execute_synchronously(request)
    }

    /// Runs a zone query, honouring `cancellation`.
    pub async fn execute(
        &self,
        request: ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        self.inner.execute(request, cancellation).await
    }

    /// Commits pending changes.
    pub fn save_synchronously(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        self.inner.save_synchronously()
    }

    /// Commits pending changes.
    pub async fn save(&self) -> Result<(), SaveError<AnyDatabaseRecord>> {
        self.inner.save().await
    }

    /// Drops pending changes.
    pub fn discard_changes(&self) {
        self.inner.discard_changes();
    }

    /// Starts a unit of work. See [`RecordContext::begin_work`].
    pub fn begin_work(&self) {
        self.inner.begin_work();
    }

    /// An ID-addressed view used to replay changes into this context.
    #[must_use]
    pub fn database_transaction(&self) -> DatabaseTransaction<'_> {
        DatabaseTransaction {
            context: self,
            created: HashMap::new(),
        }
    }
}

impl fmt::Debug for AnyDatabaseRecordContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDatabaseRecordContext")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Record operations addressed by ID.
///
/// Records created through the view are remembered, so later updates and
/// deletes of the same ID reach them without a lookup.
pub struct DatabaseTransaction<'a> {
    context: &'a AnyDatabaseRecordContext,
    created: HashMap<RecordId, AnyDatabaseRecord>,
}

impl DatabaseTransaction<'_> {
    /// Creates a record.
    pub fn create_record(
        &mut self,
        configuration: RecordConfiguration,
    ) -> CoreResult<AnyDatabaseRecord> {
        let record = self.context.create_record(configuration)?;
        self.created.insert(record.id(), record.clone());
        Ok(record)
    }

    /// Applies `update` to the record with `id`.
    pub fn update_record(&mut self, id: RecordId, update: RecordUpdate) -> CoreResult<()> {
        let record = self.resolve(id)?;
        self.context.update_record(&record, update)
    }

    /// Runs a zone query.
    pub fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        self.context.execute_synchronously(request)
    }

    /// Deletes the record with `id`.
    pub fn delete(&mut self, id: RecordId) -> CoreResult<()> {
        let record = self.resolve(id)?;
        self.created.remove(&id);
        self.context.delete(&record)
    }

    fn resolve(&self, id: RecordId) -> CoreResult<AnyDatabaseRecord> {
        if let Some(record) = self.created.get(&id) {
            return Ok(record.clone());
        }
        self.context
            .record(id)?
            .ok_or(CoreError::RecordNotFound { id })
    }
}

#[async_trait]
trait ErasedDatabase: Send + Sync {
    fn configuration(&self) -> DatabaseConfiguration;
    fn state(&self) -> DatabaseState;
    fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor>;
    async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>>;
    async fn fetch_zone(&self, name: &str) -> CoreResult<Option<Zone>>;
    fn record_context(&self, zones: &[Zone]) -> CoreResult<AnyDatabaseRecordContext>;
    async fn delete(&self) -> CoreResult<()>;
}

struct DatabaseBox<D> {
    database: Arc<D>,
}

#[async_trait]
impl<D: Database> ErasedDatabase for DatabaseBox<D> {
    fn configuration(&self) -> DatabaseConfiguration {
        self.database.configuration().clone()
    }

    fn state(&self) -> DatabaseState {
        self.database.state()
    }

    fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor> {
        self.database.schema_adaptor()
    }

    async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>> {
        self.database.fetch_all_available_zones().await
    }

    async fn fetch_zone(&self, name: &str) -> CoreResult<Option<Zone>> {
        self.database.fetch_zone(name).await
    }

    fn record_context(&self, zones: &[Zone]) -> CoreResult<AnyDatabaseRecordContext> {
        self.database
            .record_context(zones)
            .map(AnyDatabaseRecordContext::new)
    }

    async fn delete(&self) -> CoreResult<()> {
        self.database.delete().await
    }
}

struct InvalidDatabase;

#[async_trait]
impl ErasedDatabase for InvalidDatabase {
    fn configuration(&self) -> DatabaseConfiguration {
        DatabaseConfiguration::default()
    }

    fn state(&self) -> DatabaseState {
        DatabaseState::Unavailable
    }

    fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor> {
        Arc::new(IdentitySchemaAdaptor)
    }

    async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>> {
        Err(CoreError::Unavailable)
    }

    async fn fetch_zone(&self, _name: &str) -> CoreResult<Option<Zone>> {
        Err(CoreError::Unavailable)
    }

    fn record_context(&self, _zones: &[Zone]) -> CoreResult<AnyDatabaseRecordContext> {
        Err(CoreError::Unavailable)
    }

    async fn delete(&self) -> CoreResult<()> {
        Err(CoreError::Unavailable)
    }
}

/// A database of any backend.
#[derive(Clone)]
pub struct AnyDatabase {
    inner: Arc<dyn ErasedDatabase>,
}

impl AnyDatabase {
    /// Erases a backend database.
    pub fn new<D: Database>(database: D) -> Self {
        Self::from_arc(Arc::new(database))
    }

    /// Erases a shared backend database.
    pub fn from_arc<D: Database>(database: Arc<D>) -> Self {
        Self {
            inner: Arc::new(DatabaseBox { database }),
        }
    }

    /// A database that fails every operation with `Unavailable`.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            inner: Arc::new(InvalidDatabase),
        }
    }

    /// Database description.
    #[must_use]
    pub fn configuration(&self) -> DatabaseConfiguration {
        self.inner.configuration()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DatabaseState {
        self.inner.state()
    }

    /// Entity to record type mapping of the backend.
    #[must_use]
    pub fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor> {
        self.inner.schema_adaptor()
    }

    /// Lists every zone.
    pub async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>> {
        self.inner.fetch_all_available_zones().await
    }

    /// Looks up a zone by name.
    pub async fn fetch_zone(&self, name: &str) -> CoreResult<Option<Zone>> {
        self.inner.fetch_zone(name).await
    }

    /// Opens a record context over `zones`, or every zone if empty.
    pub fn record_context(&self, zones: &[Zone]) -> CoreResult<AnyDatabaseRecordContext> {
        self.inner.record_context(zones)
    }

    /// Erases all data.
    pub async fn delete(&self) -> CoreResult<()> {
        self.inner.delete().await
    }
}

impl fmt::Debug for AnyDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDatabase")
            .field("configuration", &self.configuration())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    struct PlainRecord {
        id: RecordId,
    }

    impl DatabaseRecord for PlainRecord {
        fn id(&self) -> RecordId {
            self.id
        }

        fn record_type(&self) -> RecordType {
            RecordType::new("Plain")
        }

        fn zone(&self) -> ZoneId {
            ZoneId::default_zone()
        }
    }

    #[derive(Debug, Clone)]
    struct OtherRecord;

    impl DatabaseRecord for OtherRecord {
        fn id(&self) -> RecordId {
            RecordId::from_bytes([7; 16])
        }

        fn record_type(&self) -> RecordType {
            RecordType::new("Other")
        }

        fn zone(&self) -> ZoneId {
            ZoneId::default_zone()
        }
    }

    #[derive(Default)]
    struct VecContext {
        records: Mutex<Vec<PlainRecord>>,
    }

    #[async_trait]
    impl RecordContext for VecContext {
        type Record = PlainRecord;

        fn state(&self) -> ContextState {
            ContextState::Clean
        }

        fn create_record(&self, configuration: RecordConfiguration) -> CoreResult<PlainRecord> {
            let record = PlainRecord {
                id: configuration.record_id.unwrap_or_default(),
            };
            self.records.lock().push(record.clone());
            Ok(record)
        }

        fn record(&self, id: RecordId) -> CoreResult<Option<PlainRecord>> {
            Ok(self.records.lock().iter().find(|r| r.id == id).cloned())
        }

        fn value(&self, _record: &PlainRecord, _key: &str) -> CoreResult<Option<Value>> {
            Ok(None)
        }

        fn related(&self, _record: &PlainRecord, _key: &str) -> CoreResult<Vec<RecordId>> {
            Ok(Vec::new())
        }

        fn update_record(&self, _record: &PlainRecord, _update: RecordUpdate) -> CoreResult<()> {
            Ok(())
        }

        fn delete(&self, record: &PlainRecord) -> CoreResult<()> {
            self.records.lock().retain(|r| r.id != record.id);
            Ok(())
        }

        fn execute_synchronously(
            &self,
            request: &ZoneQueryRequest,
        ) -> CoreResult<ZoneQueryResult<PlainRecord>> {
            let records = self.records.lock().clone();
            Ok(request.select(records, |_, _| None))
        }

        fn save_synchronously(&self) -> Result<(), SaveError<PlainRecord>> {
            Ok(())
        }

        fn discard_changes(&self) {}
    }

    #[test]
    fn erased_records_downcast_and_compare_by_id() {
        let id = RecordId::new();
        let erased = AnyDatabaseRecord::new(PlainRecord { id });
        assert_eq!(erased.id(), id);
        assert_eq!(erased.record_type(), RecordType::new("Plain"));
        assert!(erased.downcast_ref::<PlainRecord>().is_some());
        assert!(erased.downcast_ref::<OtherRecord>().is_none());

        let rewrapped = AnyDatabaseRecord::new(erased.clone());
        assert!(rewrapped.downcast_ref::<PlainRecord>().is_some());
        assert_eq!(rewrapped, AnyDatabaseRecord::new(PlainRecord { id }));
    }

    #[test]
    fn foreign_records_are_rejected_at_the_boundary() {
        let context = AnyDatabaseRecordContext::new(Arc::new(VecContext::default()));
        let foreign = AnyDatabaseRecord::new(OtherRecord);
        assert!(matches!(
            context.value(&foreign, "key"),
            Err(CoreError::ForeignRecord { .. })
        ));
        assert!(matches!(context.delete(&foreign), Err(CoreError::ForeignRecord { .. })));
    }

    #[test]
    fn database_transaction_addresses_records_by_id() {
        let context = AnyDatabaseRecordContext::new(Arc::new(VecContext::default()));
        let id = RecordId::new();

        let mut view = context.database_transaction();
        let created = view
            .create_record(RecordConfiguration::new(RecordType::new("Plain")).record_id(id))
            .unwrap();
        assert_eq!(created.id(), id);
        view.update_record(id, RecordUpdate::set("k", Value::Integer(1)))
            .unwrap();
        let all = view.execute_synchronously(&ZoneQueryRequest::default()).unwrap();
        assert_eq!(all.records.len(), 1);

        view.delete(id).unwrap();
        assert!(matches!(
            view.update_record(id, RecordUpdate::remove("k")),
            Err(CoreError::RecordNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_handles_are_unavailable() {
        let context = AnyDatabaseRecordContext::invalid();
        assert!(matches!(context.record(RecordId::new()), Err(CoreError::Unavailable)));
        assert!(matches!(
            context.execute(ZoneQueryRequest::default(), CancellationToken::new()).await,
            Err(CoreError::Unavailable)
        ));
        assert!(matches!(context.save().await, Err(SaveError::Failed(_))));

        let database = AnyDatabase::invalid();
        assert_eq!(database.state(), DatabaseState::Unavailable);
        assert!(matches!(database.fetch_zone("x").await, Err(CoreError::Unavailable)));
        assert!(matches!(database.record_context(&[]), Err(CoreError::Unavailable)));
        assert!(matches!(database.delete().await, Err(CoreError::Unavailable)));
    }
}
