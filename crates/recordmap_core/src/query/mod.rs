//! Queries: typed requests, predicates, translation and cancellation.

mod cancellation;
mod predicate;
mod request;
mod translator;

pub use cancellation::CancellationToken;
pub use predicate::{ComparisonOperator, Predicate, SortDescriptor, ZonePredicate};
pub use request::{
    FetchLimit, QueryCursor, QueryRequest, QueryScope, QueryTarget, ZoneQueryFilters,
    ZoneQueryRequest, ZoneQueryResult,
};
pub use translator::QueryTranslator;
