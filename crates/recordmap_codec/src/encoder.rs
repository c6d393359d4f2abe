//! Deterministic CBOR writer.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NULL: u8 = 0xf6;
const DOUBLE: u8 = 0xfb;

/// Encodes `value` to canonical CBOR.
///
/// Equal values always produce equal bytes. Map entries are ordered by
/// their encoded keys, shortest first. Arguments take their shortest form
/// and floats are always eight bytes wide.
///
/// # Errors
///
/// Returns `NaNForbidden` if `value` holds a NaN anywhere.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Appends canonical CBOR to an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    out: Vec<u8>,
}

impl CanonicalEncoder {
    /// An encoder with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value`.
    ///
    /// # Errors
    ///
    /// Returns `NaNForbidden` on a NaN float. The buffer may then hold a
    /// partial item.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.out.push(NULL),
            Value::Bool(flag) => self.out.push(if *flag { TRUE } else { FALSE }),
            Value::Integer(n) => match u64::try_from(*n) {
                Ok(unsigned) => self.head(MAJOR_UNSIGNED, unsigned),
                // !n == -1 - n, which is non-negative here
                Err(_) => self.head(MAJOR_NEGATIVE, (!*n).unsigned_abs()),
            },
            Value::Float(float) => {
                if float.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                self.out.push(DOUBLE);
                self.out.extend_from_slice(&float.to_be_bytes());
            }
            Value::Bytes(bytes) => self.string(MAJOR_BYTES, bytes),
            Value::Text(text) => self.string(MAJOR_TEXT, text.as_bytes()),
            Value::Array(items) => {
                self.head(MAJOR_ARRAY, items.len() as u64);
                items.iter().try_for_each(|item| self.encode(item))?;
            }
            Value::Map(entries) => self.map(entries)?,
        }
        Ok(())
    }

    /// Takes the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    fn string(&mut self, major: u8, bytes: &[u8]) {
        self.head(major, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }

    /// Writes a major type with its argument in the shortest form.
    fn head(&mut self, major: u8, argument: u64) {
        let major = major << 5;
        let wide = argument.to_be_bytes();
        let (info, width) = match argument {
            0..=23 => (argument as u8, 0),
            24..=0xff => (24, 1),
            0x100..=0xffff => (25, 2),
            0x1_0000..=0xffff_ffff => (26, 4),
            _ => (27, 8),
        };
        self.out.push(major | info);
        self.out.extend_from_slice(&wide[8 - width..]);
    }

    fn map(&mut self, entries: &[(Value, Value)]) -> CodecResult<()> {
        let mut keyed = entries
            .iter()
            .map(|(key, value)| Ok((to_canonical_cbor(key)?, value)))
            .collect::<CodecResult<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        self.head(MAJOR_MAP, keyed.len() as u64);
        for (key, value) in keyed {
            self.out.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}
