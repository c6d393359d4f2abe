//! Record proxies: keyed field access bound to one transaction.

mod record;
mod relationship;

pub use record::{PrimaryKeyOrRecordId, RecordProxy};
pub use relationship::RelationshipHandle;
