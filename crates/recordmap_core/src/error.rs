//! Error types for RecordMap core.

use crate::backend::SaveError;
use crate::erased::AnyDatabaseRecord;
use crate::schema::SchemaError;
use crate::types::{RecordId, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Opaque error surfaced by a storage backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in RecordMap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] recordmap_codec::CodecError),

    /// The declared entity set could not be turned into a schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A value did not match the declared attribute type.
    #[error("type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Property key.
        key: String,
        /// Declared type.
        expected: String,
        /// Requested or supplied type.
        found: String,
    },

    /// A relationship was accessed through the attribute path.
    #[error("'{key}' is a relationship; use RecordProxy::relationship")]
    RelationshipCodingUnsupported {
        /// Property key.
        key: String,
    },

    /// The entity has no property with this name.
    #[error("entity {entity} has no property '{key}'")]
    UnknownProperty {
        /// Entity name.
        entity: String,
        /// Property key.
        key: String,
    },

    /// The schema adaptor could not map a backend record type to an entity.
    #[error("no schema entry for record type '{record_type}'")]
    MissingSchemaEntry {
        /// Backend record type.
        record_type: String,
    },

    /// The requested model type is not part of the schema.
    #[error("unknown entity type: {type_name}")]
    UnknownEntityType {
        /// Model or entity name.
        type_name: String,
    },

    /// More than one attribute is marked guaranteed-unique.
    #[error("entity {entity} has more than one guaranteed-unique attribute: {attributes:?}")]
    AmbiguousPrimaryKey {
        /// Entity name.
        entity: String,
        /// Names of the guaranteed-unique attributes.
        attributes: Vec<String>,
    },

    /// A required attribute has neither a stored value nor a default.
    #[error("missing value for '{key}' on {entity}")]
    MissingValue {
        /// Entity name.
        entity: String,
        /// Property key.
        key: String,
    },

    /// A proxy was used with a transaction other than the one that created it.
    #[error("record bound to {expected} was accessed from {found}")]
    CrossTransactionAccess {
        /// Transaction the proxy is bound to.
        expected: TransactionId,
        /// Transaction supplied by the caller.
        found: TransactionId,
    },

    /// The transaction has already committed or aborted.
    #[error("transaction {id} is closed")]
    TransactionClosed {
        /// Transaction ID.
        id: TransactionId,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// A delete was refused by a `Deny` delete rule.
    #[error("cannot delete {entity}: relationship '{relationship}' still has related records")]
    DeleteDenied {
        /// Entity name.
        entity: String,
        /// Relationship holding the related records.
        relationship: String,
    },

    /// Cascading deletes went deeper than the configured limit.
    #[error("cascade delete exceeded maximum depth of {max_depth}")]
    CascadeDepthExceeded {
        /// Configured limit.
        max_depth: usize,
    },

    /// The record does not exist or has been deleted.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// Record ID.
        id: RecordId,
    },

    /// Saving the record context failed.
    #[error("save failed: {0}")]
    Save(SaveError<AnyDatabaseRecord>),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A record from a different backend was handed to a context.
    #[error("record does not belong to this backend (expected {expected})")]
    ForeignRecord {
        /// Record type the backend expected.
        expected: &'static str,
    },

    /// No database is attached.
    #[error("database unavailable")]
    Unavailable,

    /// The predicate cannot be expressed as a zone query.
    #[error("unsupported predicate on '{key}': {reason}")]
    UnsupportedPredicate {
        /// Property key.
        key: String,
        /// Why it is unsupported.
        reason: String,
    },

    /// An object attribute could not be serialized or deserialized.
    #[error("object coding failed for '{key}': {message}")]
    ObjectCoding {
        /// Property key, if known.
        key: String,
        /// Underlying error message.
        message: String,
    },

    /// Error passed through from the storage backend.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl CoreError {
    /// Create a type mismatch error.
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unknown property error.
    pub fn unknown_property(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UnknownProperty {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Create an unknown entity type error.
    pub fn unknown_entity_type(type_name: impl Into<String>) -> Self {
        Self::UnknownEntityType {
            type_name: type_name.into(),
        }
    }

    /// Create an unsupported predicate error.
    pub fn unsupported_predicate(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedPredicate {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a backend error.
    pub fn backend(error: impl Into<BackendError>) -> Self {
        Self::Backend(error.into())
    }

    /// Returns the merge conflicts carried by this error, if any.
    #[must_use]
    pub fn merge_conflicts(&self) -> Option<&[crate::backend::MergeConflict<AnyDatabaseRecord>]> {
        match self {
            Self::Save(SaveError::MergeConflicts(conflicts)) => Some(conflicts),
            _ => None,
        }
    }
}

impl From<SaveError<AnyDatabaseRecord>> for CoreError {
    fn from(error: SaveError<AnyDatabaseRecord>) -> Self {
        Self::Save(error)
    }
}
