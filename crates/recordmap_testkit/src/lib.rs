//! # RecordMap Testkit
//!
//! Test utilities for RecordMap.
//!
//! This crate provides:
//! - Fixture models and container helpers
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//! - Cross-crate integration test helpers
//!
//! ## Usage
//!
//! ```rust
//! use recordmap_testkit::prelude::*;
//!
//! let container = TestContainer::memory();
//! let executor = container.executor(&[]).unwrap();
//! let bar = executor
//!     .execute_synchronously(|txn| {
//!         let foo = txn.create::<Foo>()?;
//!         Foo::BAR.get(&foo, txn)
//!     })
//!     .unwrap();
//! assert_eq!(bar, "Untitled");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use logging::*;
