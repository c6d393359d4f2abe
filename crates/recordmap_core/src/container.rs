//! A database paired with the schema it stores.

use crate::config::Config;
use crate::erased::AnyDatabase;
use crate::error::CoreResult;
use crate::schema::{EntityDeclaration, Schema, SchemaBuilder};
use crate::transaction::TransactionExecutor;
use crate::types::Zone;
use parking_lot::RwLock;
use std::sync::Arc;

/// Owns a database and the schema built from its declarations.
///
/// Executors handed out by the container share the schema that was current
/// when they were created.
#[derive(Debug)]
pub struct DatabaseContainer {
    database: AnyDatabase,
    config: Config,
    current: RwLock<Current>,
}

#[derive(Debug)]
struct Current {
    declarations: Vec<EntityDeclaration>,
    schema: Arc<Schema>,
}

impl DatabaseContainer {
    /// Builds the schema from `declarations` and pairs it with `database`.
    pub fn new(
        database: AnyDatabase,
        declarations: Vec<EntityDeclaration>,
        config: Config,
    ) -> CoreResult<Self> {
        let schema = Arc::new(SchemaBuilder::build(&declarations)?);
        tracing::info!(
            database = %database.configuration().name,
            entities = schema.len(),
            "database container opened"
        );
        Ok(Self {
            database,
            config,
            current: RwLock::new(Current {
                declarations,
                schema,
            }),
        })
    }

    /// The current schema.
    #[must_use]
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.current.read().schema)
    }

    /// Declarations the current schema was built from.
    #[must_use]
    pub fn declarations(&self) -> Vec<EntityDeclaration> {
        self.current.read().declarations.clone()
    }

    /// The database.
    #[must_use]
    pub fn database(&self) -> &AnyDatabase {
        &self.database
    }

    /// Core configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config
    }

    /// An executor over `zones`, or every zone if empty.
    pub fn executor(&self, zones: &[Zone]) -> CoreResult<TransactionExecutor> {
        let context = self.database.record_context(zones)?;
        Ok(TransactionExecutor::new(
            context,
            self.schema(),
            self.database.schema_adaptor(),
            self.config,
        ))
    }

    /// Erases the database and replaces the schema with one built from
    /// `declarations`.
    ///
    /// The new schema is built first, so invalid declarations leave the
    /// database untouched.
    pub async fn destroy_and_rebuild(
        &self,
        declarations: Vec<EntityDeclaration>,
    ) -> CoreResult<()> {
        let schema = Arc::new(SchemaBuilder::build(&declarations)?);
        self.database.delete().await?;
        *self.current.write() = Current {
            declarations,
            schema,
        };
        tracing::info!(
            database = %self.database.configuration().name,
            "database destroyed and rebuilt"
        );
        Ok(())
    }
}
