//! Relationship access with inverse maintenance.

use super::record::RecordProxy;
use crate::error::{CoreError, CoreResult};
use crate::schema::Relationship;
use crate::transaction::Transaction;
use crate::types::RecordId;

/// Handle on one relationship of one record.
///
/// Mutations keep the inverse relationship consistent: linking a book to an
/// author adds the book to the author's books and removes it from the
/// previous author's.
#[derive(Debug, Clone)]
pub struct RelationshipHandle {
    source: RecordProxy,
    relationship: Relationship,
}

impl RelationshipHandle {
    pub(crate) fn new(source: RecordProxy, relationship: Relationship) -> Self {
        Self {
            source,
            relationship,
        }
    }

    /// The relationship description.
    #[must_use]
    pub fn relationship(&self) -> &Relationship {
        &self.relationship
    }

    /// IDs of the current destinations.
    pub fn ids(&self, txn: &Transaction) -> CoreResult<Vec<RecordId>> {
        txn.check_access(&self.source)?;
        self.source.related_ids(txn, &self.relationship)
    }

    /// Proxies of the current destinations. Deleted destinations are skipped.
    pub fn all(&self, txn: &Transaction) -> CoreResult<Vec<RecordProxy>> {
        let mut proxies = Vec::new();
        for id in self.ids(txn)? {
            if let Some(proxy) = txn.proxy_for_id(id)? {
                proxies.push(proxy);
            }
        }
        Ok(proxies)
    }

    /// The first destination, typically of a to-one relationship.
    pub fn first(&self, txn: &Transaction) -> CoreResult<Option<RecordProxy>> {
        Ok(self.all(txn)?.into_iter().next())
    }

    /// Adds `destination`. A to-one relationship is replaced instead.
    pub fn insert(&self, txn: &mut Transaction, destination: &RecordProxy) -> CoreResult<()> {
        let mut ids = self.ids(txn)?;
        if ids.contains(&destination.id()) {
            return Ok(());
        }
        if self.relationship.is_to_many() {
            ids.push(destination.id());
        } else {
            ids = vec![destination.id()];
        }
        self.replace(txn, ids, std::slice::from_ref(destination))
    }

    /// Removes `destination`. Absent destinations are ignored.
    pub fn remove(&self, txn: &mut Transaction, destination: &RecordProxy) -> CoreResult<()> {
        let mut ids = self.ids(txn)?;
        if !ids.contains(&destination.id()) {
            return Ok(());
        }
        ids.retain(|id| *id != destination.id());
        self.replace(txn, ids, &[])
    }

    /// Replaces every destination with `destinations`, in order.
    pub fn set(&self, txn: &mut Transaction, destinations: &[RecordProxy]) -> CoreResult<()> {
        txn.check_access(&self.source)?;
        if !self.relationship.is_to_many() && destinations.len() > 1 {
            return Err(CoreError::type_mismatch(
                self.relationship.name.as_str(),
                "at most one destination",
                format!("{} destinations", destinations.len()),
            ));
        }
        let mut ids: Vec<RecordId> = Vec::with_capacity(destinations.len());
        for destination in destinations {
            if !ids.contains(&destination.id()) {
                ids.push(destination.id());
            }
        }
        self.replace(txn, ids, destinations)
    }

    /// Writes `ids` and fixes up inverses of added and removed destinations.
    fn replace(
        &self,
        txn: &mut Transaction,
        ids: Vec<RecordId>,
        known: &[RecordProxy],
    ) -> CoreResult<()> {
        txn.check_access(&self.source)?;
        txn.check_writable()?;
        for destination in known {
            txn.check_access(destination)?;
            if !self
                .source
                .schema()
                .is_kind_of(destination.entity().id(), &self.relationship.destination)
            {
                return Err(CoreError::type_mismatch(
                    self.relationship.name.as_str(),
                    self.relationship.destination.as_str(),
                    destination.entity().id().as_str(),
                ));
            }
        }

        let current = self.source.related_ids(txn, &self.relationship)?;
        let removed: Vec<RecordId> =
            current.iter().filter(|id| !ids.contains(id)).copied().collect();
        let added: Vec<RecordId> = ids.iter().filter(|id| !current.contains(id)).copied().collect();

        self.source.write_related(txn, &self.relationship, ids)?;

        if self.relationship.inverse.is_none() {
            return Ok(());
        }
        for id in removed {
            if let Some(destination) = txn.proxy_for_id(id)? {
                self.unlink_inverse(txn, &destination)?;
            }
        }
        for id in added {
            let destination = match known.iter().find(|proxy| proxy.id() == id) {
                Some(proxy) => Some(proxy.clone()),
                None => txn.proxy_for_id(id)?,
            };
            if let Some(destination) = destination {
                self.link_inverse(txn, &destination)?;
            }
        }
        Ok(())
    }

    fn inverse_of(&self, destination: &RecordProxy) -> Option<Relationship> {
        let name = self.relationship.inverse.as_deref()?;
        destination.entity().relationship(name).cloned()
    }

    fn link_inverse(&self, txn: &mut Transaction, destination: &RecordProxy) -> CoreResult<()> {
        let Some(inverse) = self.inverse_of(destination) else {
            return Ok(());
        };
        let source_id = self.source.id();
        let mut ids = destination.related_ids(txn, &inverse)?;
        if ids.contains(&source_id) {
            return Ok(());
        }

        if inverse.is_to_many() {
            ids.push(source_id);
        } else {
            // The destination leaves its previous owner.
            for previous in ids {
                let Some(owner) = txn.proxy_for_id(previous)? else {
                    continue;
                };
                let Some(forward) = owner.entity().relationship(&self.relationship.name).cloned()
                else {
                    continue;
                };
                let mut owned = owner.related_ids(txn, &forward)?;
                owned.retain(|id| *id != destination.id());
                owner.write_related(txn, &forward, owned)?;
            }
            ids = vec![source_id];
        }
        destination.write_related(txn, &inverse, ids)
    }

    fn unlink_inverse(&self, txn: &mut Transaction, destination: &RecordProxy) -> CoreResult<()> {
        let Some(inverse) = self.inverse_of(destination) else {
            return Ok(());
        };
        let source_id = self.source.id();
        let mut ids = destination.related_ids(txn, &inverse)?;
        if !ids.contains(&source_id) {
            return Ok(());
        }
        ids.retain(|id| *id != source_id);
        destination.write_related(txn, &inverse, ids)
    }
}
