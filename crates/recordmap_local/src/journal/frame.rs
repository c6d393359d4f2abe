//! Journal frames.
//!
//! Every committed save is appended as one frame:
//!
//! ```text
//! | magic "RMJ1" | version u16 LE | len u32 LE | payload | checksum |
//! ```
//!
//! The payload is a canonical CBOR map holding the commit sequence, the
//! zones the commit introduced, the full post-commit contents of every
//! written record and the IDs of deleted records. The checksum is the first
//! 8 bytes of SHA-256 over header and payload.

use crate::error::{LocalError, LocalResult};
use crate::record::StoredRecord;
use recordmap_codec::{from_cbor, to_canonical_cbor, Value};
use recordmap_core::{RecordId, RecordType, Zone, ZoneId};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"RMJ1";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

const HEADER_SIZE: usize = 4 + 2 + 4;
const CHECKSUM_SIZE: usize = 8;

/// One committed save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JournalEntry {
    /// Commit sequence number.
    pub seq: u64,
    /// Zones introduced by this commit.
    pub zones: Vec<Zone>,
    /// Post-commit contents of every written record.
    pub upserts: Vec<StoredRecord>,
    /// Deleted records.
    pub deletes: Vec<RecordId>,
}

/// Encodes `entry` as a complete frame.
pub fn encode_frame(entry: &JournalEntry) -> LocalResult<Vec<u8>> {
    let payload = to_canonical_cbor(&entry_to_value(entry))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| LocalError::corrupted("journal entry too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let checksum = checksum(&frame);
    frame.extend_from_slice(&checksum);
    Ok(frame)
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

/// Entries recovered from a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Entries in commit order.
    pub entries: Vec<JournalEntry>,
    /// Length of the intact prefix.
    pub valid_len: u64,
    /// Why the tail after `valid_len` was dropped, if it was.
    pub torn_tail: Option<String>,
}

/// Reads every frame in `bytes`.
///
/// A damaged final frame is a torn write: it is reported in
/// [`Replay::torn_tail`] and everything before it is kept.
///
/// # Errors
///
/// Returns `Corrupted` if a damaged frame is followed by more data, or if a
/// frame with a valid checksum does not hold a journal entry.
pub fn replay(bytes: &[u8]) -> LocalResult<Replay> {
    let mut replay = Replay::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match read_frame(&bytes[offset..]) {
            FrameRead::Complete { payload, len } => {
                let value = from_cbor(payload)?;
                replay.entries.push(entry_from_value(&value)?);
                offset += len;
                replay.valid_len = offset as u64;
            }
            FrameRead::Truncated => {
                replay.torn_tail = Some(format!("incomplete frame at offset {offset}"));
                break;
            }
            FrameRead::Damaged { reason, len } => {
                if offset + len < bytes.len() {
                    return Err(LocalError::corrupted(format!("{reason} at offset {offset}")));
                }
                replay.torn_tail = Some(format!("{reason} at offset {offset}"));
                break;
            }
        }
    }
    Ok(replay)
}

enum FrameRead<'a> {
    Complete { payload: &'a [u8], len: usize },
    Truncated,
    Damaged { reason: &'static str, len: usize },
}

fn read_frame(bytes: &[u8]) -> FrameRead<'_> {
    if bytes.len() < HEADER_SIZE {
        return FrameRead::Truncated;
    }
    if bytes[0..4] != FRAME_MAGIC {
        return FrameRead::Damaged {
            reason: "invalid magic",
            len: bytes.len(),
        };
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let total = HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    if bytes.len() < total {
        return FrameRead::Truncated;
    }
    if version > FRAME_VERSION {
        return FrameRead::Damaged {
            reason: "unsupported frame version",
            len: total,
        };
    }

    let body_end = HEADER_SIZE + payload_len;
    if checksum(&bytes[..body_end]) != bytes[body_end..total] {
        return FrameRead::Damaged {
            reason: "checksum mismatch",
            len: total,
        };
    }
    FrameRead::Complete {
        payload: &bytes[HEADER_SIZE..body_end],
        len: total,
    }
}

fn entry_to_value(entry: &JournalEntry) -> Value {
    Value::text_map([
        ("seq", Value::Integer(entry.seq as i64)),
        (
            "zones",
            Value::Array(
                entry
                    .zones
                    .iter()
                    .map(|zone| {
                        Value::text_map([
                            ("id", Value::from(zone.id().as_str())),
                            ("name", Value::from(zone.name())),
                        ])
                    })
                    .collect(),
            ),
        ),
        (
            "upserts",
            Value::Array(entry.upserts.iter().map(record_to_value).collect()),
        ),
        ("deletes", ids_to_value(&entry.deletes)),
    ])
}

fn record_to_value(record: &StoredRecord) -> Value {
    Value::text_map([
        ("id", Value::from(record.id.as_bytes().as_slice())),
        ("type", Value::from(record.record_type.as_str())),
        ("zone", Value::from(record.zone.as_str())),
        ("version", Value::Integer(record.version as i64)),
        ("fields", Value::from(record.fields.clone())),
        (
            "relationships",
            Value::text_map(
                record
                    .relationships
                    .iter()
                    .map(|(key, ids)| (key.clone(), ids_to_value(ids))),
            ),
        ),
    ])
}

fn ids_to_value(ids: &[RecordId]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| Value::from(id.as_bytes().as_slice()))
            .collect(),
    )
}

fn entry_from_value(value: &Value) -> LocalResult<JournalEntry> {
    let zones = array(value, "zones")?
        .iter()
        .map(|zone| -> LocalResult<Zone> {
            Ok(Zone::new(ZoneId::new(text(zone, "id")?), text(zone, "name")?))
        })
        .collect::<LocalResult<Vec<_>>>()?;
    let upserts = array(value, "upserts")?
        .iter()
        .map(record_from_value)
        .collect::<LocalResult<Vec<_>>>()?;

    Ok(JournalEntry {
        seq: unsigned(value, "seq")?,
        zones,
        upserts,
        deletes: ids_from_value(field(value, "deletes")?)?,
    })
}

fn record_from_value(value: &Value) -> LocalResult<StoredRecord> {
    let id = field(value, "id")?
        .as_bytes()
        .and_then(RecordId::from_slice)
        .ok_or_else(|| LocalError::corrupted("record id is not 16 bytes"))?;

    let mut fields = BTreeMap::new();
    for (key, field_value) in map(value, "fields")? {
        fields.insert(map_key(key)?, field_value.clone());
    }
    let mut relationships = BTreeMap::new();
    for (key, ids) in map(value, "relationships")? {
        relationships.insert(map_key(key)?, ids_from_value(ids)?);
    }

    Ok(StoredRecord {
        id,
        record_type: RecordType::new(text(value, "type")?),
        zone: ZoneId::new(text(value, "zone")?),
        version: unsigned(value, "version")?,
        fields,
        relationships,
    })
}

fn ids_from_value(value: &Value) -> LocalResult<Vec<RecordId>> {
    value
        .as_array()
        .ok_or_else(|| LocalError::corrupted("expected an array of record ids"))?
        .iter()
        .map(|id| {
            id.as_bytes()
                .and_then(RecordId::from_slice)
                .ok_or_else(|| LocalError::corrupted("record id is not 16 bytes"))
        })
        .collect()
}

fn field<'a>(value: &'a Value, key: &str) -> LocalResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| LocalError::corrupted(format!("missing '{key}'")))
}

fn text(value: &Value, key: &str) -> LocalResult<String> {
    field(value, key)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| LocalError::corrupted(format!("'{key}' is not text")))
}

fn unsigned(value: &Value, key: &str) -> LocalResult<u64> {
    field(value, key)?
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| LocalError::corrupted(format!("'{key}' is not a non-negative integer")))
}

fn array<'a>(value: &'a Value, key: &str) -> LocalResult<&'a [Value]> {
    field(value, key)?
        .as_array()
        .ok_or_else(|| LocalError::corrupted(format!("'{key}' is not an array")))
}

fn map<'a>(value: &'a Value, key: &str) -> LocalResult<&'a [(Value, Value)]> {
    field(value, key)?
        .as_map()
        .ok_or_else(|| LocalError::corrupted(format!("'{key}' is not a map")))
}

fn map_key(key: &Value) -> LocalResult<String> {
    key.as_text()
        .map(str::to_string)
        .ok_or_else(|| LocalError::corrupted("map key is not text"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64) -> JournalEntry {
        let mut record = StoredRecord::new(
            RecordId::new(),
            RecordType::new("Book"),
            ZoneId::default_zone(),
        );
        record.version = 1;
        record.fields.insert("title".into(), Value::from("Dune"));
        record.fields.insert("pages".into(), Value::Integer(412));
        record
            .relationships
            .insert("authors".into(), vec![RecordId::new()]);

        JournalEntry {
            seq,
            zones: vec![Zone::named("archive")],
            upserts: vec![record],
            deletes: vec![RecordId::new()],
        }
    }

    #[test]
    fn frames_replay_in_order() {
        let first = entry(1);
        let second = entry(2);
        let mut bytes = encode_frame(&first).unwrap();
        bytes.extend(encode_frame(&second).unwrap());

        let replay = replay(&bytes).unwrap();
        assert_eq!(replay.entries, vec![first, second]);
        assert_eq!(replay.valid_len, bytes.len() as u64);
        assert!(replay.torn_tail.is_none());
    }

    #[test]
    fn torn_tail_is_dropped() {
        let first = encode_frame(&entry(1)).unwrap();
        let second = encode_frame(&entry(2)).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let replay = replay(&bytes).unwrap();
        assert_eq!(replay.entries.len(), 1);
        assert_eq!(replay.valid_len, first.len() as u64);
        assert!(replay.torn_tail.is_some());
    }

    #[test]
    fn damaged_last_frame_is_a_torn_tail() {
        let first = encode_frame(&entry(1)).unwrap();
        let mut second = encode_frame(&entry(2)).unwrap();
        let last = second.len() - 1;
        second[last] ^= 0xff;
        let mut bytes = first.clone();
        bytes.extend(second);

        let replay = replay(&bytes).unwrap();
        assert_eq!(replay.entries.len(), 1);
        assert!(replay.torn_tail.unwrap().contains("checksum"));
    }

    #[test]
    fn damage_before_the_tail_is_corruption() {
        let mut first = encode_frame(&entry(1)).unwrap();
        first[HEADER_SIZE] ^= 0xff;
        let mut bytes = first;
        bytes.extend(encode_frame(&entry(2)).unwrap());

        assert!(matches!(replay(&bytes), Err(LocalError::Corrupted(_))));
    }

    #[test]
    fn empty_journal() {
        let replay = replay(&[]).unwrap();
        assert!(replay.entries.is_empty());
        assert_eq!(replay.valid_len, 0);
    }
}
