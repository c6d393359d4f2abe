//! Transaction state and record operations.

use super::space::{RecordSpace, ScratchSpace};
use crate::backend::{RecordConfiguration, RecordUpdate, SchemaAdaptor};
use crate::config::Config;
use crate::erased::{AnyDatabaseRecord, AnyDatabaseRecordContext};
use crate::error::{CoreError, CoreResult};
use crate::model::{expect_kind_of, Model};
use crate::proxy::RecordProxy;
use crate::query::{
    CancellationToken, QueryCursor, QueryRequest, QueryTarget, QueryTranslator, ZoneQueryResult,
};
use crate::schema::{DeleteRule, Schema};
use crate::types::{RecordId, TransactionId, Zone};
use parking_lot::Mutex;
use recordmap_codec::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads and writes.
    ReadWrite,
    /// Reads only.
    ReadOnly,
}

/// A page of query results.
#[derive(Debug)]
pub struct Page<M> {
    /// Results in order.
    pub items: Vec<M>,
    /// Cursor of the next page, if there is one.
    pub next_cursor: Option<QueryCursor>,
}

/// A unit of work against one record space.
///
/// Proxies handed out by a transaction are bound to it and fail with
/// `CrossTransactionAccess` when used with any other. Each record is
/// represented by a single proxy per transaction.
pub struct Transaction {
    id: TransactionId,
    schema: Arc<Schema>,
    adaptor: Arc<dyn SchemaAdaptor>,
    config: Config,
    state: TransactionState,
    mode: TransactionMode,
    space: RecordSpace,
    proxies: Mutex<HashMap<RecordId, RecordProxy>>,
}

impl Transaction {
    pub(crate) fn new(
        schema: Arc<Schema>,
        adaptor: Arc<dyn SchemaAdaptor>,
        config: Config,
        mode: TransactionMode,
        space: RecordSpace,
    ) -> Self {
        Self {
            id: TransactionId::next(),
            schema,
            adaptor,
            config,
            state: TransactionState::Active,
            mode,
            space,
            proxies: Mutex::new(HashMap::new()),
        }
    }

    /// A transaction whose writes go to a private scratch space over
    /// `parent`.
    pub(crate) fn deferred(
        parent: AnyDatabaseRecordContext,
        schema: Arc<Schema>,
        adaptor: Arc<dyn SchemaAdaptor>,
        config: Config,
    ) -> Self {
        Self::new(
            schema,
            adaptor,
            config,
            TransactionMode::ReadWrite,
            RecordSpace::Deferred(ScratchSpace::new(parent)),
        )
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns true if the transaction refuses writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.mode == TransactionMode::ReadOnly
    }

    /// Returns true if writes are buffered in a scratch space.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.space, RecordSpace::Deferred(_))
    }

    /// Schema the transaction maps against.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Core configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a record of `M` in the default zone.
    ///
    /// Declared defaults are written at creation.
    pub fn create<M: Model>(&mut self) -> CoreResult<M> {
        self.create_record::<M>(None)
    }

    /// Creates a record of `M` in `zone`.
    pub fn create_in<M: Model>(&mut self, zone: Zone) -> CoreResult<M> {
        self.create_record::<M>(Some(zone))
    }

    fn create_record<M: Model>(&mut self, zone: Option<Zone>) -> CoreResult<M> {
        self.ensure_active()?;
        self.check_writable()?;

        let entity_id = M::entity_id();
        let entity_index = self
            .schema
            .index_of(&entity_id)
            .ok_or_else(|| CoreError::unknown_entity_type(M::ENTITY_NAME))?;

        let mut configuration = RecordConfiguration::new(self.adaptor.record_type(&entity_id))
            .record_id(RecordId::new());
        if let Some(zone) = zone {
            configuration = configuration.zone(zone);
        }
        let record = self.space.create_record(configuration)?;

        let defaults: Vec<(String, Value)> = self
            .schema
            .entity_at(entity_index)
            .attributes()
            .filter(|attribute| !attribute.configuration.is_transient)
            .filter_map(|attribute| {
                attribute
                    .default_value
                    .clone()
                    .map(|value| (attribute.storage_key().to_string(), value))
            })
            .collect();
        for (key, value) in defaults {
            self.space.update_record(&record, RecordUpdate::set(key, value))?;
        }

        let proxy = RecordProxy::new(record, entity_index, Arc::clone(&self.schema), self.id);
        self.proxies.lock().insert(proxy.id(), proxy.clone());
        tracing::debug!(
            transaction = %self.id,
            entity = M::ENTITY_NAME,
            id = %proxy.id(),
            "created record"
        );
        Ok(M::from_proxy(proxy))
    }

    /// Deletes `model`, applying the delete rules of its relationships.
    ///
    /// # Errors
    ///
    /// - `DeleteDenied` if a `Deny` relationship still has destinations.
    /// - `CascadeDepthExceeded` if cascades nest deeper than
    ///   [`Config::max_cascade_depth`].
    ///
    /// Nothing is deleted when either error is returned.
    pub fn delete<M: Model>(&mut self, model: &M) -> CoreResult<()> {
        self.delete_proxy(model.proxy())
    }

    /// Deletes the record behind `proxy`. See [`delete`](Self::delete).
    pub fn delete_proxy(&mut self, proxy: &RecordProxy) -> CoreResult<()> {
        self.check_access(proxy)?;
        self.check_writable()?;

        let doomed = self.plan_delete(proxy)?;
        let doomed_ids: HashSet<RecordId> = doomed.iter().map(RecordProxy::id).collect();

        for victim in &doomed {
            let relationships: Vec<_> = victim.entity().relationships().cloned().collect();
            for relationship in relationships {
                if relationship.delete_rule == DeleteRule::NoAction {
                    continue;
                }
                let Some(inverse_name) = relationship.inverse.as_deref() else {
                    continue;
                };
                for id in victim.related_ids(self, &relationship)? {
                    if doomed_ids.contains(&id) {
                        continue;
                    }
                    let Some(destination) = self.proxy_for_id(id)? else {
                        continue;
                    };
                    let Some(inverse) = destination.entity().relationship(inverse_name).cloned()
                    else {
                        continue;
                    };
                    let mut ids = destination.related_ids(self, &inverse)?;
                    ids.retain(|id| *id != victim.id());
                    destination.write_related(self, &inverse, ids)?;
                }
            }
        }

        for victim in &doomed {
            self.space.delete(victim.record())?;
            victim.clear_cache();
            self.proxies.lock().remove(&victim.id());
        }
        tracing::debug!(
            transaction = %self.id,
            root = %proxy.id(),
            count = doomed.len(),
            "deleted records"
        );
        Ok(())
    }

    /// Collects `root` and everything its cascade rules reach, checking deny
    /// rules on the way.
    fn plan_delete(&self, root: &RecordProxy) -> CoreResult<Vec<RecordProxy>> {
        let max_depth = self.config.max_cascade_depth;
        let mut planned = Vec::new();
        let mut seen = HashSet::from([root.id()]);
        let mut pending = vec![(root.clone(), 0_usize)];

        while let Some((proxy, depth)) = pending.pop() {
            for relationship in proxy.entity().relationships() {
                let ids = proxy.related_ids(self, relationship)?;
                match relationship.delete_rule {
                    DeleteRule::Deny if !ids.is_empty() => {
                        return Err(CoreError::DeleteDenied {
                            entity: proxy.entity().id().to_string(),
                            relationship: relationship.name.clone(),
                        });
                    }
                    DeleteRule::Cascade => {
                        for id in ids {
                            if !seen.insert(id) {
                                continue;
                            }
                            if depth + 1 > max_depth {
                                return Err(CoreError::CascadeDepthExceeded { max_depth });
                            }
                            if let Some(child) = self.proxy_for_id(id)? {
                                pending.push((child, depth + 1));
                            }
                        }
                    }
                    _ => {}
                }
            }
            planned.push(proxy);
        }
        Ok(planned)
    }

    /// Runs `request` and materializes the results.
    pub fn fetch<M: QueryTarget>(&self, request: &QueryRequest<M>) -> CoreResult<Vec<M>> {
        Ok(self.fetch_page(request)?.items)
    }

    /// Runs `request` and returns one page with the cursor of the next.
    pub fn fetch_page<M: QueryTarget>(&self, request: &QueryRequest<M>) -> CoreResult<Page<M>> {
        self.ensure_active()?;
        let zone_request = self.translator().translate(request)?;
        let result = self.space.execute_synchronously(&zone_request)?;
        self.materialize_page(result)
    }

    /// Runs `request` asynchronously, honouring `cancellation`.
    pub async fn fetch_async<M: QueryTarget>(
        &self,
        request: &QueryRequest<M>,
        cancellation: CancellationToken,
    ) -> CoreResult<Vec<M>> {
        self.ensure_active()?;
        cancellation.check()?;
        let zone_request = self.translator().translate(request)?;
        let result = self.space.execute(zone_request, cancellation.clone()).await?;
        cancellation.check()?;
        Ok(self.materialize_page(result)?.items)
    }

    /// The first record of `M`, if any.
    pub fn first<M: QueryTarget>(&self) -> CoreResult<Option<M>> {
        Ok(self
            .fetch(&QueryRequest::<M>::new().limit(1))?
            .into_iter()
            .next())
    }

    /// Number of records matching `request`, ignoring its fetch limit.
    pub fn count<M: QueryTarget>(&self, request: &QueryRequest<M>) -> CoreResult<usize> {
        self.ensure_active()?;
        let mut unbounded = request.clone();
        unbounded.fetch_limit = None;
        unbounded.sort_descriptors = None;
        let zone_request = self.translator().translate(&unbounded)?;
        Ok(self.space.execute_synchronously(&zone_request)?.records.len())
    }

    /// Looks up a record of `M` by ID.
    pub fn record<M: Model>(&self, id: RecordId) -> CoreResult<Option<M>> {
        match self.proxy_for_id(id)? {
            Some(proxy) => {
                expect_kind_of::<M>(&proxy)?;
                Ok(Some(M::from_proxy(proxy)))
            }
            None => Ok(None),
        }
    }

    /// Destinations of relationship `key` of `proxy`, as `M`s.
    pub fn related<M: Model>(&self, proxy: &RecordProxy, key: &str) -> CoreResult<Vec<M>> {
        let proxies = proxy.relationship(self, key)?.all(self)?;
        proxies
            .into_iter()
            .map(|proxy| {
                expect_kind_of::<M>(&proxy)?;
                Ok(M::from_proxy(proxy))
            })
            .collect()
    }

    /// Commits a live transaction's context.
    ///
    /// Deferred transactions are committed by their executor instead.
    pub async fn save(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let RecordSpace::Live(context) = &self.space else {
            return Err(CoreError::backend(
                "deferred transactions are committed by their executor",
            ));
        };
        context.save().await?;
        tracing::debug!(transaction = %self.id, "saved live transaction");
        Ok(())
    }

    /// Commits a live transaction's context, blocking.
    pub fn save_synchronously(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let RecordSpace::Live(context) = &self.space else {
            return Err(CoreError::backend(
                "deferred transactions are committed by their executor",
            ));
        };
        context.save_synchronously()?;
        Ok(())
    }

    /// Number of operations waiting in the scratch space.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        match &self.space {
            RecordSpace::Live(_) => 0,
            RecordSpace::Deferred(scratch) => scratch.pending_operations(),
        }
    }

    fn translator(&self) -> QueryTranslator<'_> {
        QueryTranslator::new(&self.schema, self.adaptor.as_ref())
    }

    fn materialize_page<M: QueryTarget>(
        &self,
        result: ZoneQueryResult<AnyDatabaseRecord>,
    ) -> CoreResult<Page<M>> {
        let items = result
            .records
            .into_iter()
            .map(|record| self.proxy_for_record(record).map(M::materialize))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Page {
            items,
            next_cursor: result.next_cursor,
        })
    }

    /// The proxy of `record`, creating it on first sight.
    pub(crate) fn proxy_for_record(&self, record: AnyDatabaseRecord) -> CoreResult<RecordProxy> {
        if let Some(proxy) = self.proxies.lock().get(&record.id()) {
            return Ok(proxy.clone());
        }
        let entity_id = self.translator().entity_for_record(&record.record_type())?.id().clone();
        let entity_index = self
            .schema
            .index_of(&entity_id)
            .ok_or_else(|| CoreError::unknown_entity_type(entity_id.as_str()))?;
        let proxy = RecordProxy::new(record, entity_index, Arc::clone(&self.schema), self.id);
        Ok(self
            .proxies
            .lock()
            .entry(proxy.id())
            .or_insert(proxy)
            .clone())
    }

    /// The proxy of record `id`, or `None` if it does not exist or was
    /// deleted.
    pub(crate) fn proxy_for_id(&self, id: RecordId) -> CoreResult<Option<RecordProxy>> {
        if let Some(proxy) = self.proxies.lock().get(&id) {
            return Ok(Some(proxy.clone()));
        }
        match self.space.record(id)? {
            Some(record) => self.proxy_for_record(record).map(Some),
            None => Ok(None),
        }
    }

    /// Fails unless `proxy` was created by this transaction and the
    /// transaction is active.
    ///
    /// # Panics
    ///
    /// Panics on a foreign proxy when `strict_transaction_checks` is set.
    pub(crate) fn check_access(&self, proxy: &RecordProxy) -> CoreResult<()> {
        let expected = proxy.transaction_id();
        if expected != self.id {
            assert!(
                !self.config.strict_transaction_checks,
                "record bound to {expected} was accessed from {}",
                self.id
            );
            return Err(CoreError::CrossTransactionAccess {
                expected,
                found: self.id,
            });
        }
        self.ensure_active()
    }

    pub(crate) fn check_writable(&self) -> CoreResult<()> {
        if self.is_read_only() {
            return Err(CoreError::ReadOnlyTransaction);
        }
        Ok(())
    }

    pub(crate) fn space_value(
        &self,
        record: &AnyDatabaseRecord,
        key: &str,
    ) -> CoreResult<Option<Value>> {
        self.space.value(record, key)
    }

    pub(crate) fn space_related(
        &self,
        record: &AnyDatabaseRecord,
        key: &str,
    ) -> CoreResult<Vec<RecordId>> {
        self.space.related(record, key)
    }

    pub(crate) fn space_update(
        &mut self,
        record: &AnyDatabaseRecord,
        update: RecordUpdate,
    ) -> CoreResult<()> {
        self.space.update_record(record, update)
    }

    /// Replays the scratch space into its parent. Live transactions have
    /// nothing to apply.
    pub(crate) fn apply_to_parent(&self) -> CoreResult<usize> {
        match &self.space {
            RecordSpace::Live(_) => Ok(0),
            RecordSpace::Deferred(scratch) => scratch.apply_to_parent(),
        }
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    /// Marks the transaction aborted and drops buffered changes.
    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
        if let RecordSpace::Deferred(scratch) = &mut self.space {
            scratch.discard();
        }
        self.proxies.lock().clear();
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed | TransactionState::Aborted => {
                Err(CoreError::TransactionClosed { id: self.id })
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("deferred", &self.is_deferred())
            .finish_non_exhaustive()
    }
}
