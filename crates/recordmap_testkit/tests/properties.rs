//! Property-based tests across the mapping layer.

use proptest::prelude::*;
use recordmap_core::{
    IdentitySchemaAdaptor, Model, PrefixedSchemaAdaptor, QueryRequest, QueryTranslator,
    SchemaBuilder,
};
use recordmap_testkit::prelude::*;

fn expected_after(edits: &[BookEdit]) -> (String, i64, Option<f64>) {
    let mut state = (String::new(), 0, None);
    for edit in edits {
        match edit {
            BookEdit::Title(title) => state.0 = title.clone(),
            BookEdit::Pages(pages) => state.1 = *pages,
            BookEdit::Rating(rating) => state.2 = *rating,
        }
    }
    state
}

fn apply_edits(
    book: &Book,
    txn: &mut recordmap_core::Transaction,
    edits: &[BookEdit],
) -> recordmap_core::CoreResult<()> {
    for edit in edits {
        match edit {
            BookEdit::Title(title) => Book::TITLE.set(book, txn, title.clone())?,
            BookEdit::Pages(pages) => Book::PAGES.set(book, txn, *pages)?,
            BookEdit::Rating(rating) => Book::RATING.set(book, txn, *rating)?,
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reads_after_writes_see_the_last_write(edits in book_edits_strategy(12)) {
        let container = TestContainer::memory();
        let executor = container.executor(&[]).unwrap();
        let expected = expected_after(&edits);

        let (id, seen) = executor
            .execute_synchronously(|txn| {
                let book = txn.create::<Book>()?;
                apply_edits(&book, txn, &edits)?;
                let seen = (
                    Book::TITLE.get(&book, txn)?,
                    Book::PAGES.get(&book, txn)?,
                    Book::RATING.get(&book, txn)?,
                );
                Ok((book.record_id(), seen))
            })
            .unwrap();
        prop_assert_eq!(&seen, &expected);

        let txn = executor.read_transaction();
        let book = txn.record::<Book>(id).unwrap().unwrap();
        let committed = (
            Book::TITLE.get(&book, &txn).unwrap(),
            Book::PAGES.get(&book, &txn).unwrap(),
            Book::RATING.get(&book, &txn).unwrap(),
        );
        prop_assert_eq!(committed, expected);
    }

    #[test]
    fn edits_on_committed_records_persist(
        first in book_edits_strategy(6),
        second in book_edits_strategy(6),
    ) {
        let mut harness = IntegrationHarness::new();
        let id = harness.add_book("Seed", 1);

        harness
            .executor
            .execute_synchronously(|txn| {
                let book = txn.record::<Book>(id)?.expect("seeded book");
                apply_edits(&book, txn, &first)?;
                apply_edits(&book, txn, &second)
            })
            .unwrap();

        let mut all = vec![BookEdit::Title("Seed".to_string()), BookEdit::Pages(1)];
        all.extend(first);
        all.extend(second);
        let expected = expected_after(&all);

        let txn = harness.executor.read_transaction();
        let book = txn.record::<Book>(id).unwrap().unwrap();
        prop_assert_eq!(Book::TITLE.get(&book, &txn).unwrap(), expected.0);
        prop_assert_eq!(Book::PAGES.get(&book, &txn).unwrap(), expected.1);
        prop_assert_eq!(Book::RATING.get(&book, &txn).unwrap(), expected.2);
    }

    #[test]
    fn translation_is_deterministic(
        sort in book_sort_strategy(),
        pages in pages_strategy(),
        title in title_strategy(),
        limit in 1usize..20,
        prefixed in any::<bool>(),
    ) {
        let schema = SchemaBuilder::build(&library_declarations()).unwrap();
        let prefix = PrefixedSchemaAdaptor::new("CD_");
        let translator = if prefixed {
            QueryTranslator::new(&schema, &prefix)
        } else {
            QueryTranslator::new(&schema, &IdentitySchemaAdaptor)
        };

        let request = QueryRequest::<Book>::new()
            .filter(Book::PAGES.less_or_equal(pages).or(Book::TITLE.equals(title)))
            .sort(sort)
            .limit(limit);
        let first = translator.translate(&request).unwrap();
        let second = translator.translate(&request.clone()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.limit, Some(limit));
        prop_assert_eq!(first.filters.record_types.len(), 2);
    }

    #[test]
    fn schema_build_is_deterministic(rotation in 0usize..8) {
        let declarations = library_declarations();
        let mut rotated = declarations.clone();
        rotated.rotate_left(rotation % declarations.len());

        let schema = SchemaBuilder::build(&declarations).unwrap();
        prop_assert_eq!(&schema, &SchemaBuilder::build(&declarations).unwrap());

        // declaration order changes entity order, never entity content
        let other = SchemaBuilder::build(&rotated).unwrap();
        for entity in schema.entities() {
            prop_assert_eq!(Some(entity), other.entity(entity.id()));
        }
    }

    #[test]
    fn queries_agree_with_a_plain_filter(
        pages in prop::collection::vec(pages_strategy(), 0..12),
        bound in pages_strategy(),
    ) {
        let container = TestContainer::memory();
        let executor = container.executor(&[]).unwrap();
        executor
            .execute_synchronously(|txn| {
                for count in &pages {
                    let book = txn.create::<Book>()?;
                    Book::PAGES.set(&book, txn, *count)?;
                }
                Ok(())
            })
            .unwrap();

        let txn = executor.read_transaction();
        let found: Vec<i64> = txn
            .fetch(
                &QueryRequest::<Book>::new()
                    .filter(Book::PAGES.greater_than(bound))
                    .sort(Book::PAGES.ascending()),
            )
            .unwrap()
            .iter()
            .map(|book| Book::PAGES.get(book, &txn).unwrap())
            .collect();

        let mut expected: Vec<i64> = pages.iter().copied().filter(|count| *count > bound).collect();
        expected.sort_unstable();
        prop_assert_eq!(found, expected);
    }
}
