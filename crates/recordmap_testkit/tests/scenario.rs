//! End-to-end mapping scenarios.

use recordmap_core::{
    AnyModel, CoreError, Model, PrimaryKeyOrRecordId, QueryRequest, Value,
};
use recordmap_testkit::prelude::*;

#[tokio::test]
async fn default_value_survives_commit() {
    init_tracing();
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    let bar = executor
        .execute(|txn| {
            let foo = txn.create::<Foo>()?;
            Foo::BAR.get(&foo, txn)
        })
        .await
        .unwrap();
    assert_eq!(bar, "Untitled");

    let bar = executor
        .execute(|txn| {
            let foo = txn.first::<Foo>()?.expect("committed foo");
            Foo::BAR.get(&foo, txn)
        })
        .await
        .unwrap();
    assert_eq!(bar, "Untitled");
}

#[tokio::test]
async fn written_values_are_read_back_after_commit() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    let id = executor
        .execute(|txn| {
            let book = txn.create::<Book>()?;
            Book::TITLE.set(&book, txn, "Dune".to_string())?;
            Book::PAGES.set(&book, txn, 412)?;
            Book::RATING.set(&book, txn, Some(4.5))?;
            Ok(book.record_id())
        })
        .await
        .unwrap();

    let txn = executor.read_transaction();
    let book = txn.record::<Book>(id).unwrap().unwrap();
    assert_eq!(Book::TITLE.get(&book, &txn).unwrap(), "Dune");
    assert_eq!(Book::PAGES.get(&book, &txn).unwrap(), 412);
    assert_eq!(Book::RATING.get(&book, &txn).unwrap(), Some(4.5));
}

#[test]
fn optional_attribute_without_value_reads_as_none() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    let rating = executor
        .execute_synchronously(|txn| {
            let book = txn.create::<Book>()?;
            Book::RATING.get(&book, txn)
        })
        .unwrap();
    assert_eq!(rating, None);
}

#[test]
fn required_attribute_without_value_or_default_is_missing() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    let result = executor.execute_synchronously(|txn| {
        let author = txn.create::<Author>()?;
        Author::NAME.get(&author, txn)
    });
    assert!(matches!(result, Err(CoreError::MissingValue { .. })));
}

#[test]
fn read_after_write_uses_the_proxy_cache() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            let book = txn.create::<Book>()?;
            Book::PAGES.set(&book, txn, 10)?;
            assert_eq!(Book::PAGES.get(&book, txn)?, 10);
            Book::PAGES.set(&book, txn, 20)?;
            assert_eq!(Book::PAGES.get(&book, txn)?, 20);

            book.proxy().remove_value(txn, "pages")?;
            assert_eq!(Book::PAGES.get(&book, txn)?, 0);
            assert!(!book.proxy().contains_value(txn, "pages")?);
            Ok(())
        })
        .unwrap();
}

#[test]
fn one_proxy_per_record_per_transaction() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            let created = txn.create::<Foo>()?;
            let fetched = txn.first::<Foo>()?.expect("created foo is visible");
            let looked_up = txn.record::<Foo>(created.record_id())?.expect("by id");
            assert!(created.proxy().ptr_eq(fetched.proxy()));
            assert!(created.proxy().ptr_eq(looked_up.proxy()));
            Ok(())
        })
        .unwrap();
}

#[test]
fn transient_attributes_are_never_stored() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    let id = executor
        .execute_synchronously(|txn| {
            let book = txn.create::<Book>()?;
            Book::DRAFT_NOTE.set(&book, txn, "check chapter 3".to_string())?;
            assert_eq!(Book::DRAFT_NOTE.get(&book, txn)?, "check chapter 3");
            Ok(book.record_id())
        })
        .unwrap();

    let note = executor
        .execute_synchronously(|txn| {
            let book = txn.record::<Book>(id)?.expect("committed book");
            Book::DRAFT_NOTE.get(&book, txn)
        })
        .unwrap();
    assert_eq!(note, "");
}

#[test]
fn lookup_errors_are_typed() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            let author = txn.create::<Author>()?;
            let proxy = author.proxy();

            assert!(matches!(
                proxy.decode::<i64>(txn, "name"),
                Err(CoreError::TypeMismatch { .. })
            ));
            assert!(matches!(
                proxy.decode::<String>(txn, "books"),
                Err(CoreError::RelationshipCodingUnsupported { .. })
            ));
            assert!(matches!(
                proxy.decode::<String>(txn, "nickname"),
                Err(CoreError::UnknownProperty { .. })
            ));
            assert!(matches!(
                proxy.relationship(txn, "name"),
                Err(CoreError::TypeMismatch { .. })
            ));
            assert!(matches!(
                proxy.set_value(txn, "born", Value::from("long ago")),
                Err(CoreError::TypeMismatch { .. })
            ));
            Ok(())
        })
        .unwrap();
}

#[test]
fn primary_key_or_record_id() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            let author = txn.create::<Author>()?;
            Author::NAME.set(&author, txn, "Frank Herbert".to_string())?;
            assert_eq!(
                author.proxy().primary_key_or_record_id(txn)?,
                PrimaryKeyOrRecordId::PrimaryKey(Value::from("Frank Herbert"))
            );

            let foo = txn.create::<Foo>()?;
            assert_eq!(
                foo.proxy().primary_key_or_record_id(txn)?,
                PrimaryKeyOrRecordId::RecordId(foo.record_id())
            );

            let ambiguous = txn.create::<DoubleKeyed>()?;
            assert!(matches!(
                ambiguous.proxy().primary_key_or_record_id(txn),
                Err(CoreError::AmbiguousPrimaryKey { .. })
            ));
            Ok(())
        })
        .unwrap();
}

#[test]
fn subentity_records_match_parent_queries() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            let novel = txn.create::<Novel>()?;
            Novel::TITLE.set(&novel, txn, "Emma".to_string())?;
            txn.create::<Book>()?;
            Ok(())
        })
        .unwrap();

    let txn = executor.read_transaction();
    assert_eq!(txn.count(&QueryRequest::<Book>::new()).unwrap(), 2);
    assert_eq!(txn.count(&QueryRequest::<Novel>::new()).unwrap(), 1);

    let novel = txn.first::<Novel>().unwrap().unwrap();
    assert_eq!(Novel::GENRE.get(&novel, &txn).unwrap(), "fiction");

    // a novel viewed as a book shares the same proxy
    let as_book = txn.record::<Book>(novel.record_id()).unwrap().unwrap();
    assert!(as_book.proxy().ptr_eq(novel.proxy()));
    assert_eq!(Book::TITLE.get(&as_book, &txn).unwrap(), "Emma");

    let plain = txn
        .fetch(&QueryRequest::<Book>::new().filter(Book::TITLE.equals("")))
        .unwrap();
    assert_eq!(plain.len(), 1);
    assert!(matches!(
        txn.record::<Novel>(plain[0].record_id()),
        Err(CoreError::TypeMismatch { .. })
    ));
}

#[test]
fn any_model_queries_span_every_entity() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();

    executor
        .execute_synchronously(|txn| {
            txn.create::<Foo>()?;
            txn.create::<Tag>()?;
            Ok(())
        })
        .unwrap();

    let txn = executor.read_transaction();
    let all = txn.fetch(&QueryRequest::<AnyModel>::new()).unwrap();
    assert_eq!(all.len(), 2);

    let tags: Vec<Tag> = all.into_iter().filter_map(|model| model.cast::<Tag>().ok()).collect();
    assert_eq!(tags.len(), 1);
}

#[tokio::test]
async fn destroy_and_rebuild_replaces_schema_and_data() {
    let container = TestContainer::memory();
    let executor = container.executor(&[]).unwrap();
    executor
        .execute(|txn| txn.create::<Foo>().map(|_| ()))
        .await
        .unwrap();

    container
        .destroy_and_rebuild(vec![Foo::declaration()])
        .await
        .unwrap();
    assert_eq!(container.schema().len(), 1);

    let executor = container.executor(&[]).unwrap();
    let txn = executor.read_transaction();
    assert!(txn.first::<Foo>().unwrap().is_none());
    assert!(matches!(
        txn.first::<Book>(),
        Err(CoreError::UnknownEntityType { .. })
    ));
}
