//! The committed record table and its journal.

use crate::config::LocalConfig;
use crate::error::{LocalError, LocalResult};
use crate::journal::{encode_frame, replay, JournalBackend, JournalEntry};
use crate::record::{LocalRecord, StoredRecord};
use parking_lot::{Mutex, RwLock};
use recordmap_core::{RecordId, Zone, ZoneId};
use std::collections::BTreeMap;
use std::fmt;

/// A record write in a [`ChangeSet`].
#[derive(Debug, Clone)]
pub(crate) struct Upsert {
    /// New contents. The version is assigned on commit.
    pub(crate) record: StoredRecord,
    /// Version the writer last saw; `None` if the record must not exist.
    pub(crate) expected_version: Option<u64>,
}

/// Everything one save commits.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeSet {
    pub(crate) upserts: Vec<Upsert>,
    /// Deleted records with the version the writer last saw.
    pub(crate) deletes: Vec<(RecordId, u64)>,
}

impl ChangeSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Why a commit was refused.
#[derive(Debug)]
pub(crate) enum CommitError {
    /// Records changed since the writer read them. Nothing was applied.
    Conflicts(Vec<LocalRecord>),
    /// The journal could not be written. Nothing was applied.
    Failed(LocalError),
}

#[derive(Debug)]
struct StoreState {
    records: BTreeMap<RecordId, StoredRecord>,
    zones: BTreeMap<ZoneId, Zone>,
    commit_seq: u64,
}

impl StoreState {
    fn new(default_zone: Zone) -> Self {
        let mut zones = BTreeMap::new();
        zones.insert(default_zone.id().clone(), default_zone);
        Self {
            records: BTreeMap::new(),
            zones,
            commit_seq: 0,
        }
    }

    fn apply(&mut self, entry: JournalEntry) {
        for zone in entry.zones {
            self.zones.insert(zone.id().clone(), zone);
        }
        for record in entry.upserts {
            self.records.insert(record.id, record);
        }
        for id in entry.deletes {
            self.records.remove(&id);
        }
        self.commit_seq = entry.seq;
    }

    fn conflicts(&self, changes: &ChangeSet) -> Vec<LocalRecord> {
        let mut conflicts = Vec::new();
        for upsert in &changes.upserts {
            let current = self.records.get(&upsert.record.id).map(|r| r.version);
            let conflicted = match (upsert.expected_version, current) {
                (None, None) => false,
                (Some(expected), Some(current)) => expected != current,
                _ => true,
            };
            if conflicted {
                conflicts.push(upsert.record.handle());
            }
        }
        for (id, expected) in &changes.deletes {
            if let Some(current) = self.records.get(id) {
                if current.version != *expected {
                    conflicts.push(current.handle());
                }
            }
        }
        conflicts
    }
}

/// Committed records, zones and the journal that persists them.
///
/// Every commit is checked against the versions the writer observed, written
/// to the journal as one frame and only then applied to the table. Unsorted
/// scans return records in ID order.
pub struct LocalStore {
    state: RwLock<StoreState>,
    journal: Mutex<Box<dyn JournalBackend>>,
    config: LocalConfig,
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("records", &state.records.len())
            .field("zones", &state.zones.len())
            .field("commit_seq", &state.commit_seq)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Opens a store over `journal`, replaying every intact frame.
    ///
    /// A torn final frame is logged and cut off.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if damage is found before the final frame.
    pub fn open(mut journal: Box<dyn JournalBackend>, config: LocalConfig) -> LocalResult<Self> {
        let bytes = journal.read_all()?;
        let recovered = replay(&bytes)?;
        if let Some(reason) = &recovered.torn_tail {
            tracing::warn!(
                reason = %reason,
                kept = recovered.valid_len,
                dropped = bytes.len() as u64 - recovered.valid_len,
                "truncating torn journal tail"
            );
            journal.truncate(recovered.valid_len)?;
        }

        let mut state = StoreState::new(Zone::named(config.default_zone_name.clone()));
        let commits = recovered.entries.len();
        for entry in recovered.entries {
            state.apply(entry);
        }
        tracing::debug!(
            commits,
            records = state.records.len(),
            zones = state.zones.len(),
            "journal replayed"
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Mutex::new(journal),
            config,
        })
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// The zone records land in when none is given.
    #[must_use]
    pub fn default_zone(&self) -> ZoneId {
        ZoneId::new(self.config.default_zone_name.clone())
    }

    /// Sequence number of the last commit.
    #[must_use]
    pub fn commit_seq(&self) -> u64 {
        self.state.read().commit_seq
    }

    /// Number of committed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if no record is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// A copy of a committed record.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.state.read().records.get(&id).cloned()
    }

    /// Runs `f` over a committed record without copying it.
    pub fn read<T>(&self, id: RecordId, f: impl FnOnce(&StoredRecord) -> T) -> Option<T> {
        self.state.read().records.get(&id).map(f)
    }

    /// Runs `f` over the whole committed table under one read lock.
    pub fn scan<T>(&self, f: impl FnOnce(&BTreeMap<RecordId, StoredRecord>) -> T) -> T {
        f(&self.state.read().records)
    }

    /// Every known zone.
    #[must_use]
    pub fn zones(&self) -> Vec<Zone> {
        self.state.read().zones.values().cloned().collect()
    }

    /// Looks up a zone by name.
    #[must_use]
    pub fn zone_named(&self, name: &str) -> Option<Zone> {
        self.state
            .read()
            .zones
            .values()
            .find(|zone| zone.name() == name)
            .cloned()
    }

    /// Registers `zone`, journaling it if it is new.
    pub fn create_zone(&self, zone: Zone) -> LocalResult<Zone> {
        let mut state = self.state.write();
        if let Some(existing) = state.zones.get(zone.id()) {
            return Ok(existing.clone());
        }

        let entry = JournalEntry {
            seq: state.commit_seq + 1,
            zones: vec![zone.clone()],
            ..JournalEntry::default()
        };
        self.append(&entry)?;
        state.apply(entry);
        tracing::debug!(zone = %zone.id(), "zone created");
        Ok(zone)
    }

    /// Commits `changes` atomically.
    ///
    /// Every record is checked against the version its writer observed; if
    /// any differ, all of them are reported and nothing is applied.
    pub(crate) fn commit(&self, changes: ChangeSet) -> Result<u64, CommitError> {
        let mut state = self.state.write();
        if changes.is_empty() {
            return Ok(state.commit_seq);
        }

        let conflicts = state.conflicts(&changes);
        if !conflicts.is_empty() {
            tracing::debug!(conflicts = conflicts.len(), "commit refused");
            return Err(CommitError::Conflicts(conflicts));
        }

        let seq = state.commit_seq + 1;
        let mut zones: Vec<Zone> = Vec::new();
        let upserts: Vec<StoredRecord> = changes
            .upserts
            .into_iter()
            .map(|upsert| {
                let mut record = upsert.record;
                record.version = upsert.expected_version.map_or(1, |version| version + 1);
                if !state.zones.contains_key(&record.zone)
                    && !zones.iter().any(|zone| zone.id() == &record.zone)
                {
                    zones.push(Zone::new(record.zone.clone(), record.zone.as_str()));
                }
                record
            })
            .collect();
        let entry = JournalEntry {
            seq,
            zones,
            upserts,
            deletes: changes.deletes.into_iter().map(|(id, _)| id).collect(),
        };

        self.append(&entry).map_err(CommitError::Failed)?;
        let (written, deleted) = (entry.upserts.len(), entry.deletes.len());
        state.apply(entry);
        tracing::debug!(seq, written, deleted, "commit applied");
        Ok(seq)
    }

    /// Erases every record and zone, including the journal.
    pub fn erase(&self) -> LocalResult<()> {
        let mut state = self.state.write();
        {
            let mut journal = self.journal.lock();
            journal.truncate(0)?;
            journal.sync()?;
        }
        *state = StoreState::new(Zone::named(self.config.default_zone_name.clone()));
        tracing::info!("local store erased");
        Ok(())
    }

    fn append(&self, entry: &JournalEntry) -> LocalResult<()> {
        let frame = encode_frame(entry)?;
        let mut journal = self.journal.lock();
        journal.append(&frame)?;
        if self.config.sync_on_save {
            journal.sync()
        } else {
            journal.flush()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use recordmap_codec::Value;
    use recordmap_core::RecordType;

    fn store() -> LocalStore {
        LocalStore::open(Box::new(InMemoryJournal::new()), LocalConfig::default()).unwrap()
    }

    fn new_record(title: &str) -> StoredRecord {
        let mut record = StoredRecord::new(
            RecordId::new(),
            RecordType::new("Book"),
            ZoneId::default_zone(),
        );
        record.fields.insert("title".into(), Value::from(title));
        record
    }

    fn create(store: &LocalStore, record: &StoredRecord) {
        store
            .commit(ChangeSet {
                upserts: vec![Upsert {
                    record: record.clone(),
                    expected_version: None,
                }],
                deletes: vec![],
            })
            .unwrap();
    }

    #[test]
    fn commit_assigns_versions() {
        let store = store();
        let record = new_record("Dune");
        create(&store, &record);

        let stored = store.get(record.id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(store.commit_seq(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_writes_conflict_and_apply_nothing() {
        let store = store();
        let a = new_record("a");
        let b = new_record("b");
        create(&store, &a);
        create(&store, &b);

        let mut a2 = store.get(a.id).unwrap();
        a2.fields.insert("title".into(), Value::from("a2"));
        let mut b2 = store.get(b.id).unwrap();
        b2.fields.insert("title".into(), Value::from("b2"));

        let result = store.commit(ChangeSet {
            upserts: vec![
                Upsert {
                    record: a2,
                    expected_version: Some(0),
                },
                Upsert {
                    record: b2,
                    expected_version: Some(1),
                },
            ],
            deletes: vec![],
        });

        match result {
            Err(CommitError::Conflicts(records)) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0], a.handle());
            }
            other => panic!("expected conflicts, got {other:?}"),
        }
        assert_eq!(
            store.read(b.id, |r| r.fields["title"].clone()),
            Some(Value::from("b"))
        );
        assert_eq!(store.commit_seq(), 2);
    }

    #[test]
    fn creating_an_existing_id_conflicts() {
        let store = store();
        let record = new_record("a");
        create(&store, &record);
        let result = store.commit(ChangeSet {
            upserts: vec![Upsert {
                record,
                expected_version: None,
            }],
            deletes: vec![],
        });
        assert!(matches!(result, Err(CommitError::Conflicts(_))));
    }

    #[test]
    fn replay_restores_state() {
        let journal = InMemoryJournal::new();
        let record = new_record("Dune");
        let bytes = {
            let store = LocalStore::open(Box::new(journal), LocalConfig::default()).unwrap();
            create(&store, &record);
            store.create_zone(Zone::named("archive")).unwrap();
            store
                .commit(ChangeSet {
                    upserts: vec![],
                    deletes: vec![(record.id, 1)],
                })
                .unwrap();
            let mut bytes = Vec::new();
            let journal = store.journal.lock();
            bytes.extend(journal.read_all().unwrap());
            bytes
        };

        let reopened = LocalStore::open(
            Box::new(InMemoryJournal::with_data(bytes)),
            LocalConfig::default(),
        )
        .unwrap();
        assert!(reopened.is_empty());
        assert_eq!(reopened.commit_seq(), 3);
        assert!(reopened.zone_named("archive").is_some());
        assert!(reopened.zone_named("_defaultZone").is_some());
    }

    #[test]
    fn unknown_zones_are_registered_on_commit() {
        let store = store();
        let mut record = new_record("a");
        record.zone = ZoneId::new("shelf");
        create(&store, &record);
        assert!(store.zone_named("shelf").is_some());
    }

    #[test]
    fn erase_clears_everything() {
        let store = store();
        create(&store, &new_record("a"));
        store.erase().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.commit_seq(), 0);
        assert_eq!(store.zones().len(), 1);
    }
}
