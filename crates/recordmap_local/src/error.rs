//! Error types for the local backend.

use recordmap_core::{CoreError, RecordId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for local backend operations.
pub type LocalResult<T> = Result<T, LocalError>;

/// Errors raised by the local backend.
#[derive(Debug, Error)]
pub enum LocalError {
    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to read past the end of the journal.
    #[error("read past end: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Actual journal size.
        size: u64,
    },

    /// A journal frame or its payload is malformed.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// A journal payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] recordmap_codec::CodecError),

    /// Another process holds the database lock.
    #[error("database is locked by another process")]
    Locked,

    /// The database directory does not exist.
    #[error("database directory does not exist: {}", path.display())]
    MissingDirectory {
        /// Directory that was looked for.
        path: PathBuf,
    },

    /// A record was created without a record type.
    #[error("records need a record type")]
    MissingRecordType,

    /// A record with this ID already exists.
    #[error("record already exists: {id}")]
    DuplicateRecord {
        /// Record ID.
        id: RecordId,
    },

    /// A write was attempted on a read-only database.
    #[error("database is read-only")]
    ReadOnly,
}

impl LocalError {
    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

impl From<LocalError> for CoreError {
    fn from(error: LocalError) -> Self {
        CoreError::backend(error)
    }
}
