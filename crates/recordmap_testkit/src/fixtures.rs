//! Test models and database helpers.
//!
//! The library schema used across the tests:
//!
//! ```text
//! Author 1 ──< Book >── Tag        Shelf ──> Book (deny)
//!   (cascade)   └─ Novel           Node 1 ──< Node (cascade)
//! ```

use recordmap_core::{
    AnyDatabase, Config, DatabaseContainer, DeleteRule, EntityDeclaration, Field, FieldDescriptor,
    Model, RecordProxy, RelationshipField,
};
use recordmap_local::{LocalConfig, LocalDatabase};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

macro_rules! model {
    ($(#[$meta:meta])* $name:ident => $declaration:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            proxy: RecordProxy,
        }

        impl Model for $name {
            const ENTITY_NAME: &'static str = stringify!($name);

            fn declaration() -> EntityDeclaration {
                $declaration
            }

            fn from_proxy(proxy: RecordProxy) -> Self {
                Self { proxy }
            }

            fn proxy(&self) -> &RecordProxy {
                &self.proxy
            }
        }
    };
}

model! {
    /// A single string attribute with a default.
    Foo => EntityDeclaration::new("Foo")
        .field(FieldDescriptor::of::<String>("bar").default_value("Untitled"))
}

impl Foo {
    /// `bar`, defaulting to `"Untitled"`.
    pub const BAR: Field<Foo, String> = Field::new("bar");
}

model! {
    /// Writes books; deleting an author deletes their books.
    Author => EntityDeclaration::new("Author")
        .field(FieldDescriptor::of::<String>("name").unique())
        .field(FieldDescriptor::of::<Option<i64>>("born"))
        .field(
            FieldDescriptor::to_many("books", "Book")
                .inverse("author")
                .ordered()
                .delete_rule(DeleteRule::Cascade),
        )
}

impl Author {
    /// Unique name.
    pub const NAME: Field<Author, String> = Field::new("name");
    /// Year of birth, if known.
    pub const BORN: Field<Author, Option<i64>> = Field::new("born");
    /// Books in publication order.
    pub const BOOKS: RelationshipField<Author, Book> = RelationshipField::new("books");
}

model! {
    /// A book, stored with its title under `book_title`.
    Book => EntityDeclaration::new("Book")
        .field(
            FieldDescriptor::of::<String>("title")
                .renamed("book_title")
                .default_value(""),
        )
        .field(FieldDescriptor::of::<i64>("pages").default_value(0_i64))
        .field(FieldDescriptor::of::<Option<f64>>("rating"))
        .field(FieldDescriptor::of::<String>("draft_note").transient().default_value(""))
        .field(FieldDescriptor::to_one("author", "Author").inverse("books"))
        .field(FieldDescriptor::to_many("tags", "Tag").inverse("books"))
}

impl Book {
    /// Title.
    pub const TITLE: Field<Book, String> = Field::new("title");
    /// Page count.
    pub const PAGES: Field<Book, i64> = Field::new("pages");
    /// Average rating.
    pub const RATING: Field<Book, Option<f64>> = Field::new("rating");
    /// Never stored.
    pub const DRAFT_NOTE: Field<Book, String> = Field::new("draft_note");
    /// Author.
    pub const AUTHOR: RelationshipField<Book, Author> = RelationshipField::new("author");
    /// Tags.
    pub const TAGS: RelationshipField<Book, Tag> = RelationshipField::new("tags");
}

model! {
    /// A book subentity.
    Novel => EntityDeclaration::new("Novel")
        .parent("Book")
        .field(FieldDescriptor::of::<String>("genre").default_value("fiction"))
}

impl Novel {
    /// Inherited title.
    pub const TITLE: Field<Novel, String> = Field::new("title");
    /// Genre.
    pub const GENRE: Field<Novel, String> = Field::new("genre");
}

model! {
    /// Many-to-many label for books.
    Tag => EntityDeclaration::new("Tag")
        .field(FieldDescriptor::of::<String>("label").default_value(""))
        .field(FieldDescriptor::to_many("books", "Book").inverse("tags"))
}

impl Tag {
    /// Label.
    pub const LABEL: Field<Tag, String> = Field::new("label");
    /// Tagged books.
    pub const BOOKS: RelationshipField<Tag, Book> = RelationshipField::new("books");
}

model! {
    /// Cannot be deleted while it holds books.
    Shelf => EntityDeclaration::new("Shelf")
        .field(FieldDescriptor::of::<String>("name").default_value(""))
        .field(FieldDescriptor::to_many("books", "Book").delete_rule(DeleteRule::Deny))
}

impl Shelf {
    /// Name.
    pub const NAME: Field<Shelf, String> = Field::new("name");
    /// Shelved books.
    pub const BOOKS: RelationshipField<Shelf, Book> = RelationshipField::new("books");
}

model! {
    /// Self-referencing tree; deleting a node deletes its subtree.
    Node => EntityDeclaration::new("Node")
        .field(FieldDescriptor::of::<i64>("depth").default_value(0_i64))
        .field(
            FieldDescriptor::to_many("children", "Node")
                .inverse("parent")
                .delete_rule(DeleteRule::Cascade),
        )
        .field(FieldDescriptor::to_one("parent", "Node").inverse("children"))
}

impl Node {
    /// Depth in the tree.
    pub const DEPTH: Field<Node, i64> = Field::new("depth");
    /// Children.
    pub const CHILDREN: RelationshipField<Node, Node> = RelationshipField::new("children");
    /// Parent.
    pub const PARENT: RelationshipField<Node, Node> = RelationshipField::new("parent");
}

model! {
    /// Declares two guaranteed-unique attributes, so it has no usable
    /// primary key.
    DoubleKeyed => EntityDeclaration::new("DoubleKeyed")
        .field(FieldDescriptor::of::<String>("isbn").unique().default_value(""))
        .field(FieldDescriptor::of::<String>("ean").unique().default_value(""))
}

/// Declarations of every fixture model.
#[must_use]
pub fn library_declarations() -> Vec<EntityDeclaration> {
    vec![
        Foo::declaration(),
        Author::declaration(),
        Book::declaration(),
        Novel::declaration(),
        Tag::declaration(),
        Shelf::declaration(),
        Node::declaration(),
        DoubleKeyed::declaration(),
    ]
}

/// Core configuration used by the fixtures: cross-transaction access is
/// reported as an error instead of panicking.
#[must_use]
pub fn test_config() -> Config {
    Config::new().strict_transaction_checks(false)
}

/// A container over a local database, with automatic cleanup.
pub struct TestContainer {
    /// The container.
    pub container: DatabaseContainer,
    _temp_dir: Option<TempDir>,
}

impl TestContainer {
    /// A container over an in-memory database.
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// A container over an in-memory database with `config`.
    pub fn memory_with(config: Config) -> Self {
        let database =
            LocalDatabase::in_memory(LocalConfig::default()).expect("failed to open database");
        Self {
            container: container(database, config),
            _temp_dir: None,
        }
    }

    /// A container over a database in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let database = open_file_database(&temp_dir.path().join("library"));
        Self {
            container: container(database, test_config()),
            _temp_dir: Some(temp_dir),
        }
    }

    /// The database directory, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|dir| dir.path().join("library"))
    }
}

impl std::ops::Deref for TestContainer {
    type Target = DatabaseContainer;

    fn deref(&self) -> &Self::Target {
        &self.container
    }
}

/// Opens a local database in `path`.
pub fn open_file_database(path: &Path) -> LocalDatabase {
    LocalDatabase::open(path, LocalConfig::default()).expect("failed to open database")
}

/// A container over `database` with the library schema.
pub fn container(database: LocalDatabase, config: Config) -> DatabaseContainer {
    DatabaseContainer::new(AnyDatabase::new(database), library_declarations(), config)
        .expect("library schema is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordmap_core::SchemaBuilder;

    #[test]
    fn library_schema_builds() {
        let schema = SchemaBuilder::build(&library_declarations()).unwrap();
        assert_eq!(schema.len(), 8);

        let book = schema.entity_named("Book").unwrap();
        assert_eq!(book.subentities().len(), 1);
        let author = book.relationship("author").unwrap();
        assert_eq!(author.inverse.as_deref(), Some("books"));
    }

    #[test]
    fn memory_container_has_no_path() {
        let test = TestContainer::memory();
        assert!(test.path().is_none());
        assert_eq!(test.schema().len(), 8);
    }
}
