//! Runs transaction bodies against a live record context.

use super::space::RecordSpace;
use super::state::{Transaction, TransactionMode};
use crate::backend::SchemaAdaptor;
use crate::config::Config;
use crate::erased::AnyDatabaseRecordContext;
use crate::error::CoreResult;
use crate::query::{CancellationToken, QueryRequest, QueryTarget};
use crate::schema::Schema;
use std::sync::Arc;
use tracing::Instrument;

/// Runs transactions against one live record context.
///
/// `execute` gives the body a private scratch space. When the body
/// succeeds, the scratch space is applied to the live context (phase one)
/// and the live context is saved (phase two). When the body fails, nothing
/// reaches the live context.
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    context: AnyDatabaseRecordContext,
    schema: Arc<Schema>,
    adaptor: Arc<dyn SchemaAdaptor>,
    config: Config,
}

impl TransactionExecutor {
    /// Creates an executor over `context`.
    pub fn new(
        context: AnyDatabaseRecordContext,
        schema: Arc<Schema>,
        adaptor: Arc<dyn SchemaAdaptor>,
        config: Config,
    ) -> Self {
        Self {
            context,
            schema,
            adaptor,
            config,
        }
    }

    /// The live record context.
    #[must_use]
    pub fn context(&self) -> &AnyDatabaseRecordContext {
        &self.context
    }

    /// Schema transactions map against.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A transaction writing straight to the live context. Call
    /// [`Transaction::save`] to commit it.
    ///
    /// Starts a unit of work on the live context, so versions are checked
    /// against what this transaction reads.
    #[must_use]
    pub fn live_transaction(&self) -> Transaction {
        self.context.begin_work();
        self.transaction(TransactionMode::ReadWrite, RecordSpace::Live(self.context.clone()))
    }

    /// A read-only transaction over the live context.
    #[must_use]
    pub fn read_transaction(&self) -> Transaction {
        self.transaction(TransactionMode::ReadOnly, RecordSpace::Live(self.context.clone()))
    }

    fn transaction(&self, mode: TransactionMode, space: RecordSpace) -> Transaction {
        Transaction::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.adaptor),
            self.config,
            mode,
            space,
        )
    }

    fn scratch_transaction(&self) -> Transaction {
        self.context.begin_work();
        Transaction::deferred(
            self.context.clone(),
            Arc::clone(&self.schema),
            Arc::clone(&self.adaptor),
            self.config,
        )
    }

    /// Runs `body` in a fresh transaction and commits it.
    ///
    /// # Errors
    ///
    /// Returns the body's error without touching the live context, a
    /// backend error from phase one (after which the live context's pending
    /// changes are discarded), or `Save` from phase two.
    pub async fn execute<F, R>(&self, body: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<R> + Send,
        R: Send,
    {
        let mut txn = self.scratch_transaction();
        let span = tracing::debug_span!("transaction", id = %txn.id());

        async move {
            let value = self.run_body(&mut txn, body)?;
            self.apply(&mut txn)?;

            if let Err(error) = self.context.save().await {
                tracing::warn!(%error, "transaction save failed");
                txn.mark_aborted();
                return Err(error.into());
            }
            txn.mark_committed();
            tracing::debug!("transaction committed");
            Ok(value)
        }
        .instrument(span)
        .await
    }

    /// Blocking variant of [`execute`](Self::execute).
    pub fn execute_synchronously<F, R>(&self, body: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<R>,
    {
        let mut txn = self.scratch_transaction();
        let span = tracing::debug_span!("transaction", id = %txn.id());
        let _entered = span.enter();

        let value = self.run_body(&mut txn, body)?;
        self.apply(&mut txn)?;

        if let Err(error) = self.context.save_synchronously() {
            tracing::warn!(%error, "transaction save failed");
            txn.mark_aborted();
            return Err(error.into());
        }
        txn.mark_committed();
        tracing::debug!("transaction committed");
        Ok(value)
    }

    /// Runs `request` in a read-only transaction and hands the results to
    /// `body`. Never commits.
    pub async fn execute_query<M, F, R>(
        &self,
        request: QueryRequest<M>,
        cancellation: CancellationToken,
        body: F,
    ) -> CoreResult<R>
    where
        M: QueryTarget,
        F: FnOnce(&Transaction, Vec<M>) -> CoreResult<R> + Send,
        R: Send,
    {
        let txn = self.read_transaction();
        let results = txn.fetch_async(&request, cancellation).await?;
        body(&txn, results)
    }

    /// Drops every pending change of the live context.
    pub fn discard_changes(&self) {
        self.context.discard_changes();
    }

    fn run_body<F, R>(&self, txn: &mut Transaction, body: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<R>,
    {
        match body(txn) {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::debug!(%error, "transaction body failed; discarding scratch space");
                txn.mark_aborted();
                Err(error)
            }
        }
    }

    /// Phase one: scratch space into the live context.
    fn apply(&self, txn: &mut Transaction) -> CoreResult<()> {
        match txn.apply_to_parent() {
            Ok(applied) => {
                tracing::debug!(applied, "scratch space applied");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "applying scratch space failed; discarding pending changes");
                self.context.discard_changes();
                txn.mark_aborted();
                Err(error)
            }
        }
    }
}
