//! Record spaces: where a transaction's reads and writes go.

use crate::backend::{
    DatabaseRecord, DataUpdate, RecordConfiguration, RecordUpdate, RecordUpdatePayload,
    RelationshipKind, RelationshipUpdate,
};
use crate::erased::{AnyDatabaseRecord, AnyDatabaseRecordContext};
use crate::error::{CoreError, CoreResult};
use crate::query::{CancellationToken, ZoneQueryRequest, ZoneQueryResult};
use crate::types::{RecordId, RecordType, ZoneId};
use recordmap_codec::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// A record created inside a scratch space and not yet in the backend.
#[derive(Debug, Clone)]
struct ScratchRecord {
    id: RecordId,
    record_type: RecordType,
    zone: ZoneId,
}

impl DatabaseRecord for ScratchRecord {
    fn id(&self) -> RecordId {
        self.id
    }

    fn record_type(&self) -> RecordType {
        self.record_type.clone()
    }

    fn zone(&self) -> ZoneId {
        self.zone.clone()
    }
}

/// A pending operation, in program order.
#[derive(Debug, Clone)]
enum ScratchOperation {
    Create(RecordConfiguration),
    Update { id: RecordId, update: RecordUpdate },
    Delete(RecordId),
}

/// Private overlay of pending changes on top of a parent context.
#[derive(Debug)]
pub(crate) struct ScratchSpace {
    parent: AnyDatabaseRecordContext,
    created: HashMap<RecordId, AnyDatabaseRecord>,
    values: HashMap<RecordId, HashMap<String, Option<Value>>>,
    relationships: HashMap<RecordId, HashMap<String, Vec<RecordId>>>,
    deleted: HashSet<RecordId>,
    log: Vec<ScratchOperation>,
}

impl ScratchSpace {
    pub(crate) fn new(parent: AnyDatabaseRecordContext) -> Self {
        Self {
            parent,
            created: HashMap::new(),
            values: HashMap::new(),
            relationships: HashMap::new(),
            deleted: HashSet::new(),
            log: Vec::new(),
        }
    }

    fn create_record(
        &mut self,
        configuration: RecordConfiguration,
    ) -> CoreResult<AnyDatabaseRecord> {
        let record_type = configuration
            .record_type
            .clone()
            .ok_or_else(|| CoreError::backend("scratch records need a record type"))?;
        let id = configuration.record_id.unwrap_or_default();
        let zone = configuration
            .zone
            .as_ref()
            .map_or_else(ZoneId::default_zone, |zone| zone.id().clone());

        let record = AnyDatabaseRecord::new(ScratchRecord {
            id,
            record_type,
            zone,
        });
        self.created.insert(id, record.clone());
        self.log
            .push(ScratchOperation::Create(configuration.record_id(id)));
        Ok(record)
    }

    fn record(&self, id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(record) = self.created.get(&id) {
            return Ok(Some(record.clone()));
        }
        self.parent.record(id)
    }

    fn value(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Option<Value>> {
        let id = record.id();
        if let Some(value) = self.values.get(&id).and_then(|values| values.get(key)) {
            return Ok(value.clone());
        }
        if self.created.contains_key(&id) {
            return Ok(None);
        }
        self.parent.value(record, key)
    }

    fn related(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Vec<RecordId>> {
        let id = record.id();
        if let Some(ids) = self.relationships.get(&id).and_then(|keys| keys.get(key)) {
            return Ok(ids.clone());
        }
        if self.created.contains_key(&id) {
            return Ok(Vec::new());
        }
        self.parent.related(record, key)
    }

    fn update_record(
        &mut self,
        record: &AnyDatabaseRecord,
        update: RecordUpdate,
    ) -> CoreResult<()> {
        let id = record.id();
        if self.deleted.contains(&id) {
            return Err(CoreError::RecordNotFound { id });
        }

        match &update.payload {
            RecordUpdatePayload::Data(DataUpdate::Set(value)) => {
                self.values
                    .entry(id)
                    .or_default()
                    .insert(update.key.clone(), Some(value.clone()));
            }
            RecordUpdatePayload::Data(DataUpdate::Remove) => {
                self.values
                    .entry(id)
                    .or_default()
                    .insert(update.key.clone(), None);
            }
            RecordUpdatePayload::Relationship { kind, update: change } => {
                let ids = match change {
                    RelationshipUpdate::Set(ids) => ids.clone(),
                    RelationshipUpdate::ApplyDiff(diff) => {
                        let mut ids = self.related(record, &update.key)?;
                        diff.apply(&mut ids, *kind == RelationshipKind::ToOrderedMany);
                        ids
                    }
                };
                self.relationships
                    .entry(id)
                    .or_default()
                    .insert(update.key.clone(), ids);
            }
        }

        self.log.push(ScratchOperation::Update { id, update });
        Ok(())
    }

    fn delete(&mut self, record: &AnyDatabaseRecord) -> CoreResult<()> {
        let id = record.id();
        if self.deleted.insert(id) {
            self.log.push(ScratchOperation::Delete(id));
        }
        Ok(())
    }

    /// Parent candidates plus scratch records, minus deletions, then
    /// predicate, sort and pagination over the overlaid values.
    ///
    /// Fails with the first error a value lookup returned.
    fn overlay(
        &self,
        request: &ZoneQueryRequest,
        parent: Vec<AnyDatabaseRecord>,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        let mut candidates: Vec<AnyDatabaseRecord> = parent
            .into_iter()
            .filter(|record| !self.deleted.contains(&record.id()))
            .collect();
        candidates.extend(self.log.iter().filter_map(|operation| match operation {
            ScratchOperation::Create(configuration) => configuration
                .record_id
                .filter(|id| !self.deleted.contains(id))
                .and_then(|id| self.created.get(&id).cloned()),
            _ => None,
        }));

        let failure = RefCell::new(None);
        let result = request.select(candidates, |record, key| match self.value(record, key) {
            Ok(value) => value,
            Err(error) => {
                failure.borrow_mut().get_or_insert(error);
                None
            }
        });
        match failure.into_inner() {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }

    fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        let parent = self.parent.execute_synchronously(&request.unfiltered())?;
        self.overlay(request, parent.records)
    }

    async fn execute(
        &self,
        request: &ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        let parent = self
            .parent
            .execute(request.unfiltered(), cancellation.clone())
            .await?;
        let result = self.overlay(request, parent.records)?;
        cancellation.check()?;
        Ok(result)
    }

    /// Replays the log into the parent context.
    ///
    /// Operations on records deleted later in the same space are skipped,
    /// and records both created and deleted here never reach the parent.
    pub(crate) fn apply_to_parent(&self) -> CoreResult<usize> {
        let mut parent = self.parent.database_transaction();
        let mut applied = 0;
        for operation in &self.log {
            match operation {
                ScratchOperation::Create(configuration) => {
                    let Some(id) = configuration.record_id else {
                        continue;
                    };
                    if self.deleted.contains(&id) {
                        continue;
                    }
                    parent.create_record(configuration.clone())?;
                }
                ScratchOperation::Update { id, update } => {
                    if self.deleted.contains(id) {
                        continue;
                    }
                    parent.update_record(*id, update.clone())?;
                }
                ScratchOperation::Delete(id) => {
                    if self.created.contains_key(id) {
                        continue;
                    }
                    parent.delete(*id)?;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    pub(crate) fn discard(&mut self) {
        self.created.clear();
        self.values.clear();
        self.relationships.clear();
        self.deleted.clear();
        self.log.clear();
    }

    pub(crate) fn pending_operations(&self) -> usize {
        self.log.len()
    }
}

/// Where a transaction's record operations go.
#[derive(Debug)]
pub(crate) enum RecordSpace {
    /// Straight into the backend context.
    Live(AnyDatabaseRecordContext),
    /// Into a private overlay applied to the parent on commit.
    Deferred(ScratchSpace),
}

impl RecordSpace {
    pub(crate) fn create_record(
        &mut self,
        configuration: RecordConfiguration,
    ) -> CoreResult<AnyDatabaseRecord> {
        match self {
            Self::Live(context) => context.create_record(configuration),
            Self::Deferred(scratch) => scratch.create_record(configuration),
        }
    }

    pub(crate) fn record(&self, id: RecordId) -> CoreResult<Option<AnyDatabaseRecord>> {
        match self {
            Self::Live(context) => context.record(id),
            Self::Deferred(scratch) => scratch.record(id),
        }
    }

    pub(crate) fn value(&self, record: &AnyDatabaseRecord, key: &str) -> CoreResult<Option<Value>> {
        match self {
            Self::Live(context) => context.value(record, key),
            Self::Deferred(scratch) => scratch.value(record, key),
        }
    }

    pub(crate) fn related(
        &self,
        record: &AnyDatabaseRecord,
        key: &str,
    ) -> CoreResult<Vec<RecordId>> {
        match self {
            Self::Live(context) => context.related(record, key),
            Self::Deferred(scratch) => scratch.related(record, key),
        }
    }

    pub(crate) fn update_record(
        &mut self,
        record: &AnyDatabaseRecord,
        update: RecordUpdate,
    ) -> CoreResult<()> {
        match self {
            Self::Live(context) => context.update_record(record, update),
            Self::Deferred(scratch) => scratch.update_record(record, update),
        }
    }

    pub(crate) fn delete(&mut self, record: &AnyDatabaseRecord) -> CoreResult<()> {
        match self {
            Self::Live(context) => context.delete(record),
            Self::Deferred(scratch) => scratch.delete(record),
        }
    }

    pub(crate) fn execute_synchronously(
        &self,
        request: &ZoneQueryRequest,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        match self {
            Self::Live(context) => context.execute_synchronously(request),
            Self::Deferred(scratch) => scratch.execute_synchronously(request),
        }
    }

    pub(crate) async fn execute(
        &self,
        request: ZoneQueryRequest,
        cancellation: CancellationToken,
    ) -> CoreResult<ZoneQueryResult<AnyDatabaseRecord>> {
        match self {
            Self::Live(context) => context.execute(request, cancellation).await,
            Self::Deferred(scratch) => scratch.execute(&request, cancellation).await,
        }
    }
}
