//! Identifier diffs for relationship updates.

use crate::types::RecordId;

/// Difference between two lists of relationship destinations.
///
/// Applying a diff is idempotent per element: inserting an ID that is
/// already present or removing one that is absent does nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierDiff {
    /// IDs to insert, with their index in the target list.
    pub inserted: Vec<(usize, RecordId)>,
    /// IDs to remove.
    pub removed: Vec<RecordId>,
}

impl IdentifierDiff {
    /// Computes the diff turning `old` into `new`.
    ///
    /// Returns `None` when the IDs kept by both lists appear in a different
    /// relative order, which a diff cannot express; callers fall back to a
    /// full replacement.
    #[must_use]
    pub fn between(old: &[RecordId], new: &[RecordId]) -> Option<Self> {
        let removed: Vec<RecordId> = old.iter().filter(|id| !new.contains(id)).copied().collect();
        let inserted: Vec<(usize, RecordId)> = new
            .iter()
            .enumerate()
            .filter(|(_, id)| !old.contains(id))
            .map(|(index, id)| (index, *id))
            .collect();

        let kept_old = old.iter().filter(|id| new.contains(id));
        let kept_new = new.iter().filter(|id| old.contains(id));
        if kept_old.ne(kept_new) {
            return None;
        }

        Some(Self { inserted, removed })
    }

    /// Returns true if the diff changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    /// Applies the diff in place.
    ///
    /// Removals run first, then insertions in ascending index order. Indices
    /// past the end append; unordered targets ignore indices entirely.
    pub fn apply(&self, ids: &mut Vec<RecordId>, ordered: bool) {
        ids.retain(|id| !self.removed.contains(id));

        let mut inserted = self.inserted.clone();
        inserted.sort_by_key(|(index, _)| *index);
        for (index, id) in inserted {
            if ids.contains(&id) {
                continue;
            }
            if ordered {
                ids.insert(index.min(ids.len()), id);
            } else {
                ids.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<RecordId> {
        (0..n).map(|_| RecordId::new()).collect()
    }

    #[test]
    fn diff_then_apply_reaches_target() {
        let pool = ids(5);
        let old = vec![pool[0], pool[1], pool[2]];
        let new = vec![pool[3], pool[0], pool[2], pool[4]];

        let diff = IdentifierDiff::between(&old, &new).unwrap();
        assert_eq!(diff.removed, vec![pool[1]]);
        assert_eq!(diff.inserted, vec![(0, pool[3]), (3, pool[4])]);

        let mut current = old.clone();
        diff.apply(&mut current, true);
        assert_eq!(current, new);
    }

    #[test]
    fn reorder_is_not_a_diff() {
        let pool = ids(2);
        assert!(IdentifierDiff::between(&[pool[0], pool[1]], &[pool[1], pool[0]]).is_none());
    }

    #[test]
    fn apply_is_noop_for_present_and_absent_ids() {
        let pool = ids(3);
        let diff = IdentifierDiff {
            inserted: vec![(0, pool[0])],
            removed: vec![pool[2]],
        };
        let mut current = vec![pool[0], pool[1]];
        diff.apply(&mut current, true);
        assert_eq!(current, vec![pool[0], pool[1]]);
    }

    #[test]
    fn unordered_apply_appends() {
        let pool = ids(3);
        let diff = IdentifierDiff {
            inserted: vec![(0, pool[2])],
            removed: vec![],
        };
        let mut current = vec![pool[0], pool[1]];
        diff.apply(&mut current, false);
        assert_eq!(current, vec![pool[0], pool[1], pool[2]]);
    }

    #[test]
    fn empty_diff() {
        let pool = ids(2);
        let diff = IdentifierDiff::between(&pool, &pool).unwrap();
        assert!(diff.is_empty());
    }
}
