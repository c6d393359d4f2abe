//! The local database.

use crate::config::LocalConfig;
use crate::context::LocalRecordContext;
use crate::error::{LocalError, LocalResult};
use crate::journal::{InMemoryJournal, JournalBackend, JournalDir};
use crate::store::LocalStore;
use async_trait::async_trait;
use recordmap_core::{
    CoreResult, Database, DatabaseConfiguration, DatabaseState, IdentitySchemaAdaptor,
    PrefixedSchemaAdaptor, SchemaAdaptor, Zone,
};
use std::path::Path;
use std::sync::Arc;

/// An embedded record store.
///
/// Committed records live in memory and every save is appended to a
/// journal. Opening a database replays the journal.
///
/// # Example
///
/// ```rust
/// use recordmap_local::{LocalConfig, LocalDatabase};
/// use recordmap_core::{Database, DatabaseState};
///
/// let database = LocalDatabase::in_memory(LocalConfig::default()).unwrap();
/// assert_eq!(database.state(), DatabaseState::Ready);
/// ```
#[derive(Debug)]
pub struct LocalDatabase {
    configuration: DatabaseConfiguration,
    store: Arc<LocalStore>,
    adaptor: Arc<dyn SchemaAdaptor>,
    _dir: Option<JournalDir>,
}

impl LocalDatabase {
    /// Opens a database whose journal is kept in memory.
    pub fn in_memory(config: LocalConfig) -> LocalResult<Self> {
        Self::with_journal(
            DatabaseConfiguration::new("memory"),
            Box::new(InMemoryJournal::new()),
            config,
        )
    }

    /// Opens or creates the database directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process has the directory open,
    /// `MissingDirectory` if it is absent and may not be created, or
    /// `Corrupted` if the journal is damaged before its final frame.
    pub fn open(path: &Path, config: LocalConfig) -> LocalResult<Self> {
        let name = path
            .file_name()
            .map_or_else(|| "local".to_string(), |name| name.to_string_lossy().into_owned());
        Self::open_with(DatabaseConfiguration::new(name).location(path), config)
    }

    /// Opens the directory named by `configuration.location`, or an
    /// in-memory journal if it has none.
    pub fn open_with(
        configuration: DatabaseConfiguration,
        config: LocalConfig,
    ) -> LocalResult<Self> {
        let Some(path) = configuration.location.clone() else {
            return Self::with_journal(configuration, Box::new(InMemoryJournal::new()), config);
        };

        let dir = JournalDir::open(&path, config.create_if_missing)?;
        let journal = dir.open_journal()?;
        let mut database = Self::with_journal(configuration, Box::new(journal), config)?;
        database._dir = Some(dir);
        tracing::info!(
            path = %path.display(),
            records = database.store.len(),
            "local database opened"
        );
        Ok(database)
    }

    /// Opens a database over an existing journal.
    pub fn with_journal(
        configuration: DatabaseConfiguration,
        journal: Box<dyn JournalBackend>,
        config: LocalConfig,
    ) -> LocalResult<Self> {
        let adaptor: Arc<dyn SchemaAdaptor> = match &config.record_type_prefix {
            Some(prefix) => Arc::new(PrefixedSchemaAdaptor::new(prefix.clone())),
            None => Arc::new(IdentitySchemaAdaptor),
        };
        let store = Arc::new(LocalStore::open(journal, config)?);
        Ok(Self {
            configuration,
            store,
            adaptor,
            _dir: None,
        })
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Creates a zone, or returns the existing zone with that name.
    pub fn create_zone(&self, name: &str) -> LocalResult<Zone> {
        if self.configuration.read_only {
            return Err(LocalError::ReadOnly);
        }
        if let Some(zone) = self.store.zone_named(name) {
            return Ok(zone);
        }
        self.store.create_zone(Zone::named(name))
    }
}

#[async_trait]
impl Database for LocalDatabase {
    type Context = LocalRecordContext;

    fn configuration(&self) -> &DatabaseConfiguration {
        &self.configuration
    }

    fn state(&self) -> DatabaseState {
        if self.configuration.read_only {
            DatabaseState::ReadOnly
        } else {
            DatabaseState::Ready
        }
    }

    fn schema_adaptor(&self) -> Arc<dyn SchemaAdaptor> {
        Arc::clone(&self.adaptor)
    }

    async fn fetch_all_available_zones(&self) -> CoreResult<Vec<Zone>> {
        Ok(self.store.zones())
    }

    async fn fetch_zone(&self, name: &str) -> CoreResult<Option<Zone>> {
        Ok(self.store.zone_named(name))
    }

    fn record_context(&self, zones: &[Zone]) -> CoreResult<Arc<LocalRecordContext>> {
        let scope = if zones.is_empty() {
            None
        } else {
            Some(zones.iter().map(|zone| zone.id().clone()).collect())
        };
        Ok(Arc::new(LocalRecordContext::new(
            Arc::clone(&self.store),
            scope,
            self.configuration.read_only,
        )))
    }

    async fn delete(&self) -> CoreResult<()> {
        if self.configuration.read_only {
            return Err(LocalError::ReadOnly.into());
        }
        self.store.erase()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordmap_core::{EntityId, RecordConfiguration, RecordContext, RecordType};
    use tempfile::tempdir;

    #[tokio::test]
    async fn default_zone_is_always_available() {
        let database = LocalDatabase::in_memory(LocalConfig::default()).unwrap();
        let zones = database.fetch_all_available_zones().await.unwrap();
        assert_eq!(zones, vec![Zone::named("_defaultZone")]);
        assert!(database.fetch_zone("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_zones_are_listed() {
        let database = LocalDatabase::in_memory(LocalConfig::default()).unwrap();
        let archive = database.create_zone("archive").unwrap();
        assert_eq!(database.create_zone("archive").unwrap(), archive);
        assert_eq!(database.fetch_zone("archive").await.unwrap(), Some(archive));
        assert_eq!(database.fetch_all_available_zones().await.unwrap().len(), 2);
    }

    #[test]
    fn prefix_selects_adaptor() {
        let database =
            LocalDatabase::in_memory(LocalConfig::default().record_type_prefix("CD_")).unwrap();
        let record_type = database.schema_adaptor().record_type(&EntityId::new("Book"));
        assert_eq!(record_type.as_str(), "CD_Book");
    }

    #[tokio::test]
    async fn delete_erases_records_and_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library");
        {
            let database = LocalDatabase::open(&path, LocalConfig::default()).unwrap();
            let context = database.record_context(&[]).unwrap();
            context
                .create_record(RecordConfiguration::new(RecordType::new("Book")))
                .unwrap();
            context.save().await.unwrap();
            assert_eq!(database.store().len(), 1);

            database.delete().await.unwrap();
            assert!(database.store().is_empty());
        }

        let reopened = LocalDatabase::open(&path, LocalConfig::default()).unwrap();
        assert!(reopened.store().is_empty());
    }

    #[test]
    fn read_only_database_reports_state() {
        let database = LocalDatabase::open_with(
            DatabaseConfiguration::new("archive").read_only(true),
            LocalConfig::default(),
        )
        .unwrap();
        assert_eq!(database.state(), DatabaseState::ReadOnly);
        assert!(matches!(database.create_zone("x"), Err(LocalError::ReadOnly)));
    }
}
