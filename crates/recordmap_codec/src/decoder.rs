//! Strict reader for canonical CBOR.
//!
//! Anything the encoder would not have produced is rejected: long-form
//! arguments, unsorted or duplicate map keys, indefinite lengths, tags,
//! narrow floats and NaN.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Upper bound on array and map element counts.
const ELEMENT_LIMIT: u64 = 1 << 24;

/// Upper bound on byte and text string lengths.
const STRING_LIMIT: u64 = 1 << 28;

/// Preallocation cap, so a hostile length cannot reserve huge buffers.
const PREALLOCATE_LIMIT: usize = 1024;

/// Decodes exactly one value from `bytes`.
///
/// # Errors
///
/// Fails if the input is not canonical CBOR or has bytes left over.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    match decoder.remaining().len() {
        0 => Ok(value),
        remaining => Err(CodecError::TrailingBytes { remaining }),
    }
}

/// The initial byte of a data item, split into its two fields.
#[derive(Clone, Copy)]
struct Head {
    major: u8,
    info: u8,
}

impl Head {
    fn from_byte(byte: u8) -> Self {
        Self {
            major: byte >> 5,
            info: byte & 0x1f,
        }
    }
}

/// Pulls values off a byte slice one at a time.
#[derive(Debug, Clone)]
pub struct CanonicalDecoder<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Starts reading at the beginning of `input`.
    #[must_use]
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    /// True once every input byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining().is_empty()
    }

    /// Input not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.input.get(self.offset..).unwrap_or_default()
    }

    /// Reads the next value.
    ///
    /// # Errors
    ///
    /// Fails on truncated or non-canonical input.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let head = Head::from_byte(self.take(1)?[0]);
        match head.major {
            0 => self.argument(head).and_then(non_negative),
            1 => self.argument(head).and_then(negative),
            2 => {
                let bytes = self.string(head)?;
                Ok(Value::Bytes(bytes.to_vec()))
            }
            3 => {
                let bytes = self.string(head)?;
                std::str::from_utf8(bytes)
                    .map(|text| Value::Text(text.to_owned()))
                    .map_err(|_| CodecError::InvalidUtf8)
            }
            4 => {
                let count = self.length(head, ELEMENT_LIMIT)?;
                let mut items = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
                for _ in 0..count {
                    items.push(self.decode()?);
                }
                Ok(Value::Array(items))
            }
            5 => self.map(head),
            6 => Err(CodecError::unsupported_type("tagged value")),
            _ => self.simple(head),
        }
    }

    fn take(&mut self, count: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|end| *end <= self.input.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let slice = &self.input[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_fixed<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut buffer = [0u8; N];
        buffer.copy_from_slice(self.take(N)?);
        Ok(buffer)
    }

    /// Reads the argument of `head`, requiring its shortest form.
    fn argument(&mut self, head: Head) -> CodecResult<u64> {
        let (value, floor) = match head.info {
            info @ 0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.take_fixed::<1>()?[0]), 24),
            25 => (u64::from(u16::from_be_bytes(self.take_fixed()?)), 1 << 8),
            26 => (u64::from(u32::from_be_bytes(self.take_fixed()?)), 1 << 16),
            27 => (u64::from_be_bytes(self.take_fixed()?), 1 << 32),
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < floor {
            return Err(CodecError::invalid_structure(format!(
                "argument {value} is not in its shortest form"
            )));
        }
        Ok(value)
    }

    fn length(&mut self, head: Head, limit: u64) -> CodecResult<usize> {
        let claimed = self.argument(head)?;
        if claimed > limit {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed: limit,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed: limit,
        })
    }

    fn string(&mut self, head: Head) -> CodecResult<&'a [u8]> {
        let len = self.length(head, STRING_LIMIT)?;
        self.take(len)
    }

    fn map(&mut self, head: Head) -> CodecResult<Value> {
        let count = self.length(head, ELEMENT_LIMIT)?;
        let mut entries = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        let mut previous: Option<&'a [u8]> = None;

        for _ in 0..count {
            let start = self.offset;
            let key = self.decode()?;
            let encoded_key = &self.input[start..self.offset];

            // length-first, then bytewise; equal keys are duplicates
            if let Some(previous) = previous {
                let order = previous
                    .len()
                    .cmp(&encoded_key.len())
                    .then_with(|| previous.cmp(encoded_key));
                if order != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "map keys are unsorted or repeated",
                    ));
                }
            }
            previous = Some(encoded_key);
            entries.push((key, self.decode()?));
        }
        Ok(Value::Map(entries))
    }

    fn simple(&mut self, head: Head) -> CodecResult<Value> {
        match head.info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 | 26 => Err(CodecError::NarrowFloat),
            27 => {
                let float = f64::from_be_bytes(self.take_fixed()?);
                if float.is_nan() {
                    Err(CodecError::NaNForbidden)
                } else {
                    Ok(Value::Float(float))
                }
            }
            31 => Err(CodecError::invalid_structure("unexpected break")),
            info => Err(CodecError::unsupported_type(format!("simple value {info}"))),
        }
    }
}

fn non_negative(argument: u64) -> CodecResult<Value> {
    i64::try_from(argument)
        .map(Value::Integer)
        .map_err(|_| CodecError::invalid_structure("integer out of i64 range"))
}

fn negative(argument: u64) -> CodecResult<Value> {
    i64::try_from(argument)
        .map(|magnitude| Value::Integer(-1 - magnitude))
        .map_err(|_| CodecError::invalid_structure("integer out of i64 range"))
}
