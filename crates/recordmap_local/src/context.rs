//! Record contexts over a [`LocalStore`].

use crate::error::LocalError;
use crate::record::{LocalRecord, StoredRecord};
use crate::store::{ChangeSet, CommitError, LocalStore, Upsert};
use async_trait::async_trait;
use parking_lot::Mutex;
use recordmap_codec::Value;
use recordmap_core::{
    ContextState, CoreError, CoreResult, DatabaseRecord, MergeConflict, RecordConfiguration,
    RecordContext, RecordId, RecordUpdate, SaveError, ZoneId, ZoneQueryRequest, ZoneQueryResult,
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Pending {
    /// Records created here and not yet committed.
    created: HashSet<RecordId>,
    /// Working copies of every created or modified record.
    staged: BTreeMap<RecordId, StoredRecord>,
    /// Committed records marked for deletion.
    deleted: HashSet<RecordId>,
    /// Version of each committed record when the current unit of work
    /// first saw it.
    observed: HashMap<RecordId, u64>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.deleted.is_empty()
    }

    fn observe(&mut self, record: &StoredRecord) {
        self.observed.entry(record.id).or_insert(record.version);
    }

    /// Drops observations of records without a pending change.
    fn forget_unchanged(&mut self) {
        let Pending {
            staged,
            deleted,
            observed,
            ..
        } = self;
        observed.retain(|id, _| staged.contains_key(id) || deleted.contains(id));
    }

    /// The working copy of `id`, staging it from the store on first write.
    fn stage(&mut self, store: &LocalStore, id: RecordId) -> CoreResult<&mut StoredRecord> {
        if self.deleted.contains(&id) {
            return Err(CoreError::RecordNotFound { id });
        }
        match self.staged.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let current = store.get(id).ok_or(CoreError::RecordNotFound { id })?;
                self.observed.entry(id).or_insert(current.version);
                Ok(entry.insert(current))
            }
        }
    }

    fn change_set(&self) -> ChangeSet {
        let upserts = self
            .staged
            .values()
            .map(|record| Upsert {
                record: record.clone(),
                expected_version: if self.created.contains(&record.id) {
                    None
                } else {
                    self.observed.get(&record.id).copied()
                },
            })
            .collect();
        let deletes = self
            .deleted
            .iter()
            .filter_map(|id| self.observed.get(id).map(|version| (*id, *version)))
            .collect();
        ChangeSet { upserts, deletes }
    }
}

#[derive(Debug)]
struct Inner {
    pending: Pending,
    state: ContextState,
}

/// A scratchpad of pending changes over a [`LocalStore`].
///
/// Reads see committed data overlaid with this context's pending changes.
/// `save` commits every change in one journal frame, or none of them if any
/// record was changed by another context since this one first read it.
#[derive(Debug)]
pub struct LocalRecordContext {
    store: Arc<LocalStore>,
    zones: Option<Vec<ZoneId>>,
    read_only: bool,
    inner: Mutex<Inner>,
}

impl LocalRecordContext {
    /// A context over `zones`, or over every zone if `None`.
    #[must_use]
    pub fn new(store: Arc<LocalStore>, zones: Option<Vec<ZoneId>>, read_only: bool) -> Self {
        Self {
            store,
            zones,
            read_only,
            inner: Mutex::new(Inner {
                pending: Pending::default(),
                state: ContextState::Clean,
            }),
        }
    }

    /// The store this context commits to.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Number of records with pending changes.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        let inner = self.inner.lock();
        inner.pending.staged.len() + inner.pending.deleted.len()
    }

    fn in_scope(&self, zone: &ZoneId) -> bool {
        self.zones
            .as_ref()
            .map_or(true, |zones| zones.contains(zone))
    }

    fn check_writable(&self) -> CoreResult<()> {
        if self.read_only {
            return Err(LocalError::ReadOnly.into());
        }
        Ok(())
    }

    /// Runs `f` over the current view of one record.
    fn with_record<T>(
        &self,
        id: RecordId,
        f: impl FnOnce(&StoredRecord) -> T,
    ) -> CoreResult<Option<T>> {
        let mut inner = self.inner.lock();
        let pending = &mut inner.pending;
        if pending.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(record) = pending.staged.get(&id) {
            return Ok(Some(f(record)));
        }
        Ok(self
            .store
            .read(id, |record| {
                pending.observe(record);
                self.in_scope(&record.zone).then(|| f(record))
            })
            .flatten())
    }
}

#[async_trait]
impl RecordContext for LocalRecordContext {
    type Record = LocalRecord;

    fn state(&self) -> ContextState {
        self.inner.lock().state
    }

    fn create_record(&self, configuration: RecordConfiguration) -> CoreResult<LocalRecord> {
        self.check_writable()?;
        let record_type = configuration
            .record_type
            .ok_or(LocalError::MissingRecordType)?;
        let id = configuration.record_id.unwrap_or_default();
        let zone = configuration
            .zone
            .map_or_else(|| self.store.default_zone(), |zone| zone.id().clone());

        let mut inner = self.inner.lock();
        let exists = inner.pending.staged.contains_key(&id)
            || (!inner.pending.deleted.contains(&id) && self.store.read(id, |_| ()).is_some());
        if exists {
            return Err(LocalError::DuplicateRecord { id }.into());
        }

        let record = StoredRecord::new(id, record_type, zone);
        let handle = record.handle();
        inner.pending.created.insert(id);
        inner.pending.staged.insert(id, record);
        inner.state = ContextState::Dirty;
        Ok(handle)
    }

    fn record(&self, id: RecordId) -> CoreResult<Option<LocalRecord>> {
        self.with_record(id, StoredRecord::handle)
    }

    fn value(&self, record: &LocalRecord, key: &str) -> CoreResult<Option<Value>> {
        let id = record.id();
        self.with_record(id, |stored| stored.fields.get(key).cloned())?
            .ok_or(CoreError::RecordNotFound { id })
    }

    fn related(&self, record: &LocalRecord, key: &str) -> CoreResult<Vec<RecordId>> {
        let id = record.id();
        self.with_record(id, |stored| {
            stored.relationships.get(key).cloned().unwrap_or_default()
        })?
        .ok_or(CoreError::RecordNotFound { id })
    }

    fn update_record(&self, record: &LocalRecord, update: RecordUpdate) -> CoreResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        inner.pending.stage(&self.store, record.id())?.apply(update);
        inner.state = ContextState::Dirty;
        Ok(())
    }

    fn delete(&self, record: &LocalRecord) -> CoreResult<()> {
        self.check_writable()?;
        let id = record.id();
        let mut inner = self.inner.lock();
        let pending = &mut inner.pending;

        if pending.created.remove(&id) {
            pending.staged.remove(&id);
        } else if !pending.deleted.contains(&id) {
            let version = self
                .store
                .read(id, |stored| stored.version)
                .ok_or(CoreError::RecordNotFound { id })?;
            pending.observed.entry(id).or_insert(version);
            pending.staged.remove(&id);
            pending.deleted.insert(id);
        }
        inner.state = ContextState::Dirty;
        Ok(())
    }

    fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<LocalRecord>> {
        let inner = self.inner.lock();
        let pending = &inner.pending;

        Ok(self.store.scan(|committed| {
            let mut view: BTreeMap<RecordId, &StoredRecord> = committed
                .iter()
                .filter(|(id, _)| !pending.deleted.contains(id))
                .map(|(id, record)| (*id, record))
                .collect();
            view.extend(pending.staged.iter().map(|(id, record)| (*id, record)));
            view.retain(|_, record| self.in_scope(&record.zone));

            let candidates: Vec<LocalRecord> =
                view.values().map(|record| record.handle()).collect();
            request.select(candidates, |record, key| {
                view.get(&record.id())
                    .and_then(|stored| stored.fields.get(key).cloned())
            })
        }))
    }

    fn save_synchronously(&self) -> Result<(), SaveError<LocalRecord>> {
        let mut inner = self.inner.lock();
        if inner.pending.is_empty() {
            inner.pending.observed.clear();
            inner.state = ContextState::Clean;
            return Ok(());
        }
        if self.read_only {
            return Err(SaveError::Failed(Box::new(LocalError::ReadOnly)));
        }

        inner.state = ContextState::Saving;
        match self.store.commit(inner.pending.change_set()) {
            Ok(seq) => {
                inner.pending = Pending::default();
                inner.state = ContextState::Clean;
                tracing::debug!(seq, "context saved");
                Ok(())
            }
            Err(CommitError::Conflicts(records)) => {
                inner.state = ContextState::Conflicted;
                tracing::warn!(conflicts = records.len(), "save hit merge conflicts");
                Err(SaveError::MergeConflicts(
                    records
                        .into_iter()
                        .map(|source| MergeConflict { source })
                        .collect(),
                ))
            }
            Err(CommitError::Failed(error)) => {
                inner.state = ContextState::Dirty;
                tracing::warn!(%error, "save failed");
                Err(SaveError::Failed(Box::new(error)))
            }
        }
    }

    fn discard_changes(&self) {
        let mut inner = self.inner.lock();
        inner.pending = Pending::default();
        inner.state = ContextState::Clean;
    }

    fn begin_work(&self) {
        let mut inner = self.inner.lock();
        let before = inner.pending.observed.len();
        inner.pending.forget_unchanged();
        tracing::trace!(
            forgotten = before - inner.pending.observed.len(),
            "unit of work started"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use crate::journal::InMemoryJournal;
    use recordmap_core::{ComparisonOperator, RecordType, SortDescriptor, ZonePredicate};

    fn store() -> Arc<LocalStore> {
        let journal = Box::new(InMemoryJournal::new());
        Arc::new(LocalStore::open(journal, LocalConfig::default()).unwrap())
    }

    fn context(store: &Arc<LocalStore>) -> LocalRecordContext {
        LocalRecordContext::new(Arc::clone(store), None, false)
    }

    fn book(context: &LocalRecordContext, title: &str) -> LocalRecord {
        let record = context
            .create_record(RecordConfiguration::new(RecordType::new("Book")))
            .unwrap();
        context
            .update_record(&record, RecordUpdate::set("title", Value::from(title)))
            .unwrap();
        record
    }

    #[test]
    fn state_transitions() {
        let store = store();
        let context = context(&store);
        assert_eq!(context.state(), ContextState::Clean);

        book(&context, "Dune");
        assert_eq!(context.state(), ContextState::Dirty);

        context.save_synchronously().unwrap();
        assert_eq!(context.state(), ContextState::Clean);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn pending_changes_are_private_until_save() {
        let store = store();
        let writer = context(&store);
        let reader = context(&store);

        let record = book(&writer, "Dune");
        assert_eq!(reader.record(record.id()).unwrap(), None);

        writer.save_synchronously().unwrap();
        let seen = reader.record(record.id()).unwrap().unwrap();
        assert_eq!(
            reader.value(&seen, "title").unwrap(),
            Some(Value::from("Dune"))
        );
    }

    #[test]
    fn deletes_are_visible_before_save() {
        let store = store();
        let context = context(&store);
        let record = book(&context, "Dune");
        context.save_synchronously().unwrap();

        context.delete(&record).unwrap();
        assert_eq!(context.record(record.id()).unwrap(), None);
        assert!(matches!(
            context.value(&record, "title"),
            Err(CoreError::RecordNotFound { .. })
        ));
        assert_eq!(store.len(), 1);

        context.save_synchronously().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn explicit_record_ids_are_honoured() {
        let store = store();
        let context = context(&store);
        let id = RecordId::new();
        let record = context
            .create_record(RecordConfiguration::new(RecordType::new("Book")).record_id(id))
            .unwrap();
        assert_eq!(record.id(), id);

        let duplicate =
            context.create_record(RecordConfiguration::new(RecordType::new("Book")).record_id(id));
        assert!(matches!(duplicate, Err(CoreError::Backend(_))));
    }

    #[test]
    fn concurrent_edit_conflicts_and_keeps_pending() {
        let store = store();
        let setup = context(&store);
        let shared = book(&setup, "original");
        let other = book(&setup, "other");
        setup.save_synchronously().unwrap();

        let first = context(&store);
        let second = context(&store);
        second.value(&shared, "title").unwrap();

        first
            .update_record(&shared, RecordUpdate::set("title", Value::from("first")))
            .unwrap();
        first.save_synchronously().unwrap();

        second
            .update_record(&shared, RecordUpdate::set("title", Value::from("second")))
            .unwrap();
        second
            .update_record(&other, RecordUpdate::set("title", Value::from("changed")))
            .unwrap();
        let error = second.save_synchronously().unwrap_err();

        assert_eq!(error.conflicts().len(), 1);
        assert_eq!(error.conflicts()[0].source.id(), shared.id());
        assert_eq!(second.state(), ContextState::Conflicted);
        assert_eq!(second.pending_records(), 2);
        assert_eq!(
            store.read(other.id(), |r| r.fields["title"].clone()),
            Some(Value::from("other"))
        );

        second.discard_changes();
        assert_eq!(second.state(), ContextState::Clean);
        assert_eq!(second.pending_records(), 0);
    }

    #[test]
    fn new_unit_of_work_forgets_stale_reads() {
        let store = store();
        let setup = context(&store);
        let shared = book(&setup, "original");
        setup.save_synchronously().unwrap();

        let reader = context(&store);
        reader.value(&shared, "title").unwrap();

        let writer = context(&store);
        writer
            .update_record(&shared, RecordUpdate::set("title", Value::from("changed")))
            .unwrap();
        writer.save_synchronously().unwrap();

        reader.begin_work();
        assert_eq!(
            reader.value(&shared, "title").unwrap(),
            Some(Value::from("changed"))
        );
        reader
            .update_record(&shared, RecordUpdate::set("title", Value::from("again")))
            .unwrap();
        reader.save_synchronously().unwrap();
        assert_eq!(
            store.read(shared.id(), |r| r.fields["title"].clone()),
            Some(Value::from("again"))
        );
    }

    #[test]
    fn begin_work_keeps_observations_of_pending_changes() {
        let store = store();
        let setup = context(&store);
        let shared = book(&setup, "original");
        setup.save_synchronously().unwrap();

        let slow = context(&store);
        slow.update_record(&shared, RecordUpdate::set("title", Value::from("slow")))
            .unwrap();

        let fast = context(&store);
        fast.update_record(&shared, RecordUpdate::set("title", Value::from("fast")))
            .unwrap();
        fast.save_synchronously().unwrap();

        slow.begin_work();
        let error = slow.save_synchronously().unwrap_err();
        assert_eq!(error.conflicts().len(), 1);
    }

    #[test]
    fn queries_see_pending_changes() {
        let store = store();
        let context = context(&store);
        book(&context, "b");
        book(&context, "a");
        context.save_synchronously().unwrap();
        let pending = book(&context, "c");

        let request = ZoneQueryRequest {
            sort_descriptors: Some(vec![SortDescriptor::ascending("title")]),
            ..ZoneQueryRequest::default()
        };
        let result = context.execute_synchronously(&request).unwrap();
        let titles: Vec<Value> = result
            .records
            .iter()
            .map(|record| context.value(record, "title").unwrap().unwrap())
            .collect();
        assert_eq!(
            titles,
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );

        context.delete(&pending).unwrap();
        let filtered = ZoneQueryRequest {
            predicate: Some(ZonePredicate::Compare {
                key: "title".into(),
                op: ComparisonOperator::Equal,
                value: Value::from("c"),
            }),
            ..ZoneQueryRequest::default()
        };
        assert!(context.execute_synchronously(&filtered).unwrap().records.is_empty());
    }

    #[test]
    fn zone_scoped_context_hides_other_zones() {
        let store = store();
        let writer = context(&store);
        let record = writer
            .create_record(
                RecordConfiguration::new(RecordType::new("Book"))
                    .zone(recordmap_core::Zone::named("archive")),
            )
            .unwrap();
        writer.save_synchronously().unwrap();

        let scoped =
            LocalRecordContext::new(Arc::clone(&store), Some(vec![store.default_zone()]), false);
        assert_eq!(scoped.record(record.id()).unwrap(), None);
        assert!(scoped
            .execute_synchronously(&ZoneQueryRequest::default())
            .unwrap()
            .records
            .is_empty());
    }

    #[test]
    fn read_only_context_refuses_writes() {
        let store = store();
        let context = LocalRecordContext::new(store, None, true);
        let result = context.create_record(RecordConfiguration::new(RecordType::new("Book")));
        assert!(matches!(result, Err(CoreError::Backend(_))));
    }
}
