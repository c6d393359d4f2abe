//! # RecordMap Local
//!
//! An embedded, journaled record store implementing the RecordMap backend
//! contracts.
//!
//! Committed records are held in an in-memory table. Every successful save
//! is appended to a journal as one checksummed frame, and opening a database
//! replays the journal. Saves are checked optimistically: a record changed
//! by another context since this context first read it makes the whole save
//! fail with merge conflicts.
//!
//! ## Example
//!
//! ```rust
//! use recordmap_core::{Database, RecordConfiguration, RecordContext, RecordType};
//! use recordmap_local::{LocalConfig, LocalDatabase};
//!
//! let database = LocalDatabase::in_memory(LocalConfig::default()).unwrap();
//! let context = database.record_context(&[]).unwrap();
//! context
//!     .create_record(RecordConfiguration::new(RecordType::new("Book")))
//!     .unwrap();
//! context.save_synchronously().unwrap();
//! assert_eq!(database.store().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod database;
mod error;
pub mod journal;
mod record;
mod store;

pub use config::LocalConfig;
pub use context::LocalRecordContext;
pub use database::LocalDatabase;
pub use error::{LocalError, LocalResult};
pub use record::{LocalRecord, StoredRecord};
pub use store::LocalStore;
