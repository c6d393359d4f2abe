//! Proptest strategies for property-based tests.

use proptest::prelude::*;
use recordmap_codec::Value;
use recordmap_core::{RecordId, SortDescriptor, Zone};

/// Strategy for record IDs.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    any::<[u8; 16]>().prop_map(RecordId::from_bytes)
}

/// Strategy for book titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,11}( [A-Z][a-z]{0,11}){0,3}"
}

/// Strategy for page counts.
pub fn pages_strategy() -> impl Strategy<Value = i64> {
    0_i64..5_000
}

/// Strategy for zone names, never the default zone.
pub fn zone_strategy() -> impl Strategy<Value = Zone> {
    "[a-z]{3,10}".prop_map(Zone::named)
}

/// Strategy for leaf values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9_f64..1.0e9).prop_map(Value::Float),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for values nested up to two levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(2, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                .prop_map(|entries| Value::text_map(entries)),
        ]
    })
}

/// Strategy for sort descriptors over the stored book attributes.
pub fn book_sort_strategy() -> impl Strategy<Value = SortDescriptor> {
    (prop::sample::select(vec!["title", "pages", "rating"]), any::<bool>()).prop_map(
        |(key, ascending)| {
            if ascending {
                SortDescriptor::ascending(key)
            } else {
                SortDescriptor::descending(key)
            }
        },
    )
}

/// One write in a sequence of book edits.
#[derive(Debug, Clone)]
pub enum BookEdit {
    /// Set the title.
    Title(String),
    /// Set the page count.
    Pages(i64),
    /// Set or clear the rating.
    Rating(Option<f64>),
}

/// Strategy for single book edits.
pub fn book_edit_strategy() -> impl Strategy<Value = BookEdit> {
    prop_oneof![
        title_strategy().prop_map(BookEdit::Title),
        pages_strategy().prop_map(BookEdit::Pages),
        prop::option::of(0.0_f64..5.0).prop_map(BookEdit::Rating),
    ]
}

/// Strategy for sequences of book edits.
pub fn book_edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<BookEdit>> {
    prop::collection::vec(book_edit_strategy(), 1..=max_len)
}
