//! Transactions, record spaces and the executor that commits them.

mod executor;
mod space;
mod state;

pub use executor::TransactionExecutor;
pub use state::{Page, Transaction, TransactionMode, TransactionState};
