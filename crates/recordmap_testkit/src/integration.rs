//! Cross-crate integration test helpers.
//!
//! Drives the mapping layer over a local database and checks the results
//! against an independent record of what was written.

use crate::fixtures::{Book, TestContainer};
use recordmap_core::{
    CoreError, CoreResult, Model, QueryRequest, RecordId, Transaction, TransactionExecutor,
};
use std::collections::HashMap;

/// Title and page count the harness expects a book to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedBook {
    /// Title.
    pub title: String,
    /// Page count.
    pub pages: i64,
}

/// A test harness tracking books written through the executor.
pub struct IntegrationHarness {
    /// The container.
    pub container: TestContainer,
    /// Executor every operation goes through.
    pub executor: TransactionExecutor,
    books: HashMap<RecordId, ExpectedBook>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory database.
    pub fn new() -> Self {
        Self::over(TestContainer::memory())
    }

    /// Creates a harness over `container`.
    pub fn over(container: TestContainer) -> Self {
        let executor = container
            .executor(&[])
            .expect("failed to create executor");
        Self {
            container,
            executor,
            books: HashMap::new(),
        }
    }

    /// Creates and commits a book.
    pub fn add_book(&mut self, title: &str, pages: i64) -> RecordId {
        let id = self
            .executor
            .execute_synchronously(|txn| {
                let book = txn.create::<Book>()?;
                Book::TITLE.set(&book, txn, title.to_string())?;
                Book::PAGES.set(&book, txn, pages)?;
                Ok(book.record_id())
            })
            .expect("failed to add book");
        self.books.insert(
            id,
            ExpectedBook {
                title: title.to_string(),
                pages,
            },
        );
        id
    }

    /// Renames a committed book.
    pub fn rename(&mut self, id: RecordId, title: &str) {
        self.executor
            .execute_synchronously(|txn| {
                let book = require_book(txn, id)?;
                Book::TITLE.set(&book, txn, title.to_string())
            })
            .expect("failed to rename book");
        if let Some(expected) = self.books.get_mut(&id) {
            expected.title = title.to_string();
        }
    }

    /// Deletes a committed book.
    pub fn delete(&mut self, id: RecordId) {
        self.executor
            .execute_synchronously(|txn| {
                let book = require_book(txn, id)?;
                txn.delete(&book)
            })
            .expect("failed to delete book");
        self.books.remove(&id);
    }

    /// Reads a book in a fresh read-only transaction.
    pub fn read(&self, id: RecordId) -> Option<ExpectedBook> {
        let txn = self.executor.read_transaction();
        let book = txn.record::<Book>(id).expect("failed to read book")?;
        Some(ExpectedBook {
            title: Book::TITLE.get(&book, &txn).expect("failed to read title"),
            pages: Book::PAGES.get(&book, &txn).expect("failed to read pages"),
        })
    }

    /// Checks every tracked book, and that no untracked book exists.
    pub fn verify_all(&self) {
        for (id, expected) in &self.books {
            assert_eq!(
                self.read(*id).as_ref(),
                Some(expected),
                "book {id} does not match"
            );
        }
        let txn = self.executor.read_transaction();
        let stored = txn
            .count(&QueryRequest::<Book>::new())
            .expect("failed to count books");
        assert_eq!(stored, self.books.len(), "unexpected number of books");
    }

    /// Number of tracked books.
    pub fn tracked_count(&self) -> usize {
        self.books.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn require_book(txn: &Transaction, id: RecordId) -> CoreResult<Book> {
    txn.record::<Book>(id)?
        .ok_or(CoreError::RecordNotFound { id })
}

/// Reusable transaction scenarios.
pub mod scenarios {
    use super::*;

    /// A failing body leaves the database untouched.
    pub fn failed_body_is_discarded(harness: &mut IntegrationHarness) {
        let id = harness.add_book("Original", 100);

        let result: CoreResult<()> = harness.executor.execute_synchronously(|txn| {
            let book = require_book(txn, id)?;
            Book::TITLE.set(&book, txn, "Modified".to_string())?;
            txn.create::<Book>()?;
            Err(CoreError::backend("simulated failure"))
        });
        assert!(result.is_err());

        harness.verify_all();
    }

    /// Changes made by one executor are visible to another after commit.
    pub fn commits_are_visible_to_other_executors(harness: &mut IntegrationHarness) {
        let id = harness.add_book("Shared", 10);
        let other = harness
            .container
            .executor(&[])
            .expect("failed to create executor");

        let seen = other
            .execute_synchronously(|txn| {
                let book = require_book(txn, id)?;
                Book::TITLE.get(&book, txn)
            })
            .expect("failed to read from second executor");
        assert_eq!(seen, "Shared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_adds_renames_and_deletes() {
        let mut harness = IntegrationHarness::new();
        let first = harness.add_book("Dune", 412);
        let second = harness.add_book("Emma", 320);
        harness.rename(first, "Dune Messiah");
        harness.delete(second);

        assert_eq!(harness.tracked_count(), 1);
        assert_eq!(harness.read(second), None);
        harness.verify_all();
    }

    #[test]
    fn failed_body_scenario() {
        scenarios::failed_body_is_discarded(&mut IntegrationHarness::new());
    }

    #[test]
    fn visibility_scenario() {
        scenarios::commits_are_visible_to_other_executors(&mut IntegrationHarness::new());
    }
}
