//! # RecordMap Codec
//!
//! The dynamic attribute [`Value`] model shared by every RecordMap crate,
//! and its canonical CBOR encoding.
//!
//! Canonical encoding guarantees that identical values produce identical
//! bytes, which the local backend relies on for journal checksums.
//!
//! ## Encoding rules
//!
//! - Maps are sorted by key (length-first, then bytewise on encoded keys)
//! - Integers use shortest encoding
//! - Floats are always 64-bit; NaN is rejected
//! - Strings must be UTF-8
//! - No indefinite-length items, no tags
//!
//! ## Usage
//!
//! ```
//! use recordmap_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::text_map([("title", Value::from("Untitled"))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("NaN has no encoding", |f| !f.is_nan())
                .prop_map(Value::Float),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z]{0,8}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::text_map(m)),
            ]
        })
    }

    #[test]
    fn nested_record_payload() {
        let value = Value::text_map([
            (
                "books",
                Value::Array(vec![
                    Value::text_map([("title", Value::from("Dune")), ("pages", Value::from(412))]),
                    Value::text_map([("title", Value::from("Emma")), ("price", Value::from(9.5))]),
                ]),
            ),
            ("name", Value::from("Frank")),
        ]);
        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    proptest! {
        #[test]
        fn canonical_encoding_is_stable(value in arb_value()) {
            let bytes = to_canonical_cbor(&value).unwrap();
            let decoded = from_cbor(&bytes).unwrap();
            prop_assert_eq!(to_canonical_cbor(&decoded).unwrap(), bytes);
        }
    }
}
