//! Records as the local store keeps them.

use recordmap_codec::Value;
use recordmap_core::{
    DataUpdate, DatabaseRecord, RecordId, RecordType, RecordUpdate, RecordUpdatePayload,
    RelationshipKind, RelationshipUpdate, ZoneId,
};
use std::collections::BTreeMap;

/// Handle to a record in a [`crate::LocalDatabase`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalRecord {
    id: RecordId,
    record_type: RecordType,
    zone: ZoneId,
}

impl LocalRecord {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: RecordId, record_type: RecordType, zone: ZoneId) -> Self {
        Self {
            id,
            record_type,
            zone,
        }
    }
}

impl DatabaseRecord for LocalRecord {
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

/// Full contents of one record.
///
/// `version` is 0 for a record that has never been committed and grows by
/// one with every commit that touches the record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Record ID.
    pub id: RecordId,
    /// Backend record type.
    pub record_type: RecordType,
    /// Zone the record lives in.
    pub zone: ZoneId,
    /// Commit version.
    pub version: u64,
    /// Attribute values by storage key.
    pub fields: BTreeMap<String, Value>,
    /// Relationship destinations by storage key.
    pub relationships: BTreeMap<String, Vec<RecordId>>,
}

impl StoredRecord {
    /// An empty, uncommitted record.
    #[must_use]
    pub fn new(id: RecordId, record_type: RecordType, zone: ZoneId) -> Self {
        Self {
            id,
            record_type,
            zone,
            version: 0,
            fields: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Handle to this record.
    #[must_use]
    pub fn handle(&self) -> LocalRecord {
        LocalRecord::new(self.id, self.record_type.clone(), self.zone.clone())
    }

    /// Applies one update in place.
    pub fn apply(&mut self, update: RecordUpdate) {
        let RecordUpdate { key, payload } = update;
        match payload {
            RecordUpdatePayload::Data(DataUpdate::Set(value)) => {
                self.fields.insert(key, value);
            }
            RecordUpdatePayload::Data(DataUpdate::Remove) => {
                self.fields.remove(&key);
            }
            RecordUpdatePayload::Relationship {
                update: RelationshipUpdate::Set(ids),
                ..
            } => {
                self.relationships.insert(key, ids);
            }
            RecordUpdatePayload::Relationship {
                kind,
                update: RelationshipUpdate::ApplyDiff(diff),
            } => {
                let ids = self.relationships.entry(key).or_default();
                diff.apply(ids, kind == RelationshipKind::ToOrderedMany);
            }
        }
    }
}
