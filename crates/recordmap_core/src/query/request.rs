//! Typed query requests and the zone queries backends execute.

use super::predicate::{Predicate, SortDescriptor, ZonePredicate};
use crate::backend::DatabaseRecord;
use crate::proxy::RecordProxy;
use crate::types::{EntityId, RecordId, RecordType, Zone, ZoneId};
use recordmap_codec::Value;
use std::fmt;
use std::marker::PhantomData;

/// A type that query results can be turned into.
///
/// Every [`crate::Model`] is a query target for its own entity; the
/// [`crate::AnyModel`] target matches every entity.
pub trait QueryTarget: Sized + Send + 'static {
    /// Entity the query is restricted to, or `None` for every entity.
    fn target_entity() -> Option<EntityId>;

    /// Wraps a proxy of a matching record.
    fn materialize(proxy: RecordProxy) -> Self;
}

/// Position in a paginated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryCursor {
    /// Number of matching records to skip.
    pub offset: usize,
    /// Page size used to produce the cursor.
    pub page_size: usize,
}

impl QueryCursor {
    /// A cursor at the start of the results.
    #[must_use]
    pub const fn first_page(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
        }
    }
}

/// How many results a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimit {
    /// At most this many records.
    Count(usize),
    /// One page starting at the cursor.
    Cursor(QueryCursor),
}

/// Explicit restriction of a query to zones or record IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    /// Only these zones.
    pub zones: Option<Vec<Zone>>,
    /// Only these records.
    pub record_ids: Option<Vec<RecordId>>,
}

/// A backend-neutral query for records of `M`.
pub struct QueryRequest<M> {
    /// Filter over declared property names.
    pub predicate: Option<Predicate>,
    /// Sort order.
    pub sort_descriptors: Option<Vec<SortDescriptor>>,
    /// Count or pagination.
    pub fetch_limit: Option<FetchLimit>,
    /// Zone or record restriction.
    pub scope: Option<QueryScope>,
    _target: PhantomData<fn() -> M>,
}

impl<M> QueryRequest<M> {
    /// A request for every record of `M`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            predicate: None,
            sort_descriptors: None,
            fetch_limit: None,
            scope: None,
            _target: PhantomData,
        }
    }

    /// Adds a filter, combined with any existing one by `and`.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Appends a sort descriptor.
    #[must_use]
    pub fn sort(mut self, descriptor: SortDescriptor) -> Self {
        self.sort_descriptors
            .get_or_insert_with(Vec::new)
            .push(descriptor);
        self
    }

    /// Returns at most `count` records.
    #[must_use]
    pub fn limit(mut self, count: usize) -> Self {
        self.fetch_limit = Some(FetchLimit::Count(count));
        self
    }

    /// Returns the page at `cursor`.
    #[must_use]
    pub fn cursor(mut self, cursor: QueryCursor) -> Self {
        self.fetch_limit = Some(FetchLimit::Cursor(cursor));
        self
    }

    /// Restricts the query to `zones`.
    #[must_use]
    pub fn in_zones(mut self, zones: Vec<Zone>) -> Self {
        self.scope.get_or_insert_with(QueryScope::default).zones = Some(zones);
        self
    }

    /// Restricts the query to `ids`.
    #[must_use]
    pub fn with_record_ids(mut self, ids: Vec<RecordId>) -> Self {
        self.scope.get_or_insert_with(QueryScope::default).record_ids = Some(ids);
        self
    }
}

impl<M> Default for QueryRequest<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for QueryRequest<M> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            sort_descriptors: self.sort_descriptors.clone(),
            fetch_limit: self.fetch_limit,
            scope: self.scope.clone(),
            _target: PhantomData,
        }
    }
}

impl<M> fmt::Debug for QueryRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("target", &std::any::type_name::<M>())
            .field("predicate", &self.predicate)
            .field("sort_descriptors", &self.sort_descriptors)
            .field("fetch_limit", &self.fetch_limit)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Which records a zone query looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZoneQueryFilters {
    /// Only these zones, if set.
    pub zones: Option<Vec<ZoneId>>,
    /// Only these records, if set.
    pub record_ids: Option<Vec<RecordId>>,
    /// Accepted record types. Empty accepts every type.
    pub record_types: Vec<RecordType>,
    /// Whether `record_types` already lists subentity types.
    pub includes_subentities: bool,
}

impl ZoneQueryFilters {
    /// Returns true if `record` passes the zone, ID and type filters.
    #[must_use]
    pub fn matches<R: DatabaseRecord>(&self, record: &R) -> bool {
        if let Some(zones) = &self.zones {
            if !zones.contains(&record.zone()) {
                return false;
            }
        }
        if let Some(ids) = &self.record_ids {
            if !ids.contains(&record.id()) {
                return false;
            }
        }
        self.record_types.is_empty() || self.record_types.contains(&record.record_type())
    }
}

/// A query in backend terms: storage keys and record types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneQueryRequest {
    /// Record selection.
    pub filters: ZoneQueryFilters,
    /// Filter over storage keys.
    pub predicate: Option<ZonePredicate>,
    /// Sort order over storage keys.
    pub sort_descriptors: Option<Vec<SortDescriptor>>,
    /// Start of the page.
    pub cursor: Option<QueryCursor>,
    /// Maximum number of records.
    pub limit: Option<usize>,
}

impl ZoneQueryRequest {
    /// Filters, sorts and paginates `candidates`.
    ///
    /// `lookup` reads a stored value of a candidate by storage key. Backends
    /// without a native query engine use this directly.
    pub fn select<R, I, F>(&self, candidates: I, lookup: F) -> ZoneQueryResult<R>
    where
        R: DatabaseRecord,
        I: IntoIterator<Item = R>,
        F: Fn(&R, &str) -> Option<Value>,
    {
        let mut records: Vec<R> = candidates
            .into_iter()
            .filter(|record| self.filters.matches(record))
            .filter(|record| {
                self.predicate
                    .as_ref()
                    .map_or(true, |predicate| predicate.evaluate(&|key: &str| lookup(record, key)))
            })
            .collect();

        if let Some(descriptors) = &self.sort_descriptors {
            records.sort_by(|a, b| {
                descriptors
                    .iter()
                    .map(|descriptor| {
                        let left = lookup(a, &descriptor.key).unwrap_or(Value::Null);
                        let right = lookup(b, &descriptor.key).unwrap_or(Value::Null);
                        let ordering = left.sort_cmp(&right);
                        if descriptor.ascending {
                            ordering
                        } else {
                            ordering.reverse()
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        self.paginate(records)
    }

    /// Applies cursor and limit to already filtered and sorted records.
    #[must_use]
    pub fn paginate<R>(&self, records: Vec<R>) -> ZoneQueryResult<R> {
        let offset = self.cursor.map_or(0, |cursor| cursor.offset);
        let page_size = self.limit.or(self.cursor.map(|cursor| cursor.page_size));
        let total = records.len();

        let page: Vec<R> = records
            .into_iter()
            .skip(offset)
            .take(page_size.unwrap_or(usize::MAX))
            .collect();
        let end = offset.saturating_add(page.len());

        let next_cursor = match page_size {
            Some(page_size) if end < total => Some(QueryCursor {
                offset: end,
                page_size,
            }),
            _ => None,
        };

        ZoneQueryResult {
            records: page,
            next_cursor,
        }
    }

    /// The same request without predicate, sort or pagination.
    ///
    /// Overlays use this to fetch every candidate from a parent context.
    #[must_use]
    pub fn unfiltered(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            ..Self::default()
        }
    }
}

/// Records returned by a zone query.
#[derive(Debug, Clone)]
pub struct ZoneQueryResult<R> {
    /// Matching records, in order.
    pub records: Vec<R>,
    /// Cursor of the next page, if there is one.
    pub next_cursor: Option<QueryCursor>,
}

impl<R> ZoneQueryResult<R> {
    /// Converts every record.
    pub fn map<S>(self, f: impl FnMut(R) -> S) -> ZoneQueryResult<S> {
        ZoneQueryResult {
            records: self.records.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

impl<R> Default for ZoneQueryResult<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_cursor: None,
        }
    }
}
