//! Core identifier types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identifier of a backend record.
///
/// Record IDs are 128-bit UUIDs. Backends may allocate them, or accept an
/// explicit ID supplied in a [`crate::RecordConfiguration`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creates a record ID from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        Uuid::from_slice(slice).ok().map(Self)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the ID as a UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Name of a schema entity.
    EntityId
);

string_id!(
    /// Backend record type. Maps 1:1 to an [`EntityId`] through a
    /// [`crate::SchemaAdaptor`].
    RecordType
);

string_id!(
    /// Identifier of a zone.
    ZoneId
);

impl ZoneId {
    /// Name of the zone records land in when none is given.
    pub const DEFAULT_NAME: &'static str = "_defaultZone";

    /// The default zone identifier.
    #[must_use]
    pub fn default_zone() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

/// A backend partition of records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    id: ZoneId,
    name: String,
}

impl Zone {
    /// Creates a zone.
    #[must_use]
    pub fn new(id: ZoneId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Creates a zone whose identifier is its name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ZoneId::new(name.clone()),
            name,
        }
    }

    /// Returns the zone identifier.
    #[must_use]
    pub fn id(&self) -> &ZoneId {
        &self.id
    }

    /// Returns the zone name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Process-unique transaction identity.
///
/// Proxies remember the ID of the transaction that created them and refuse
/// to be used from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u64);

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

impl TransactionId {
    /// Allocates the next transaction ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Identity token of an entity that stays stable across schema versions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersistentTypeId([u8; 16]);

impl PersistentTypeId {
    /// Derives the token from an entity's stable name.
    #[must_use]
    pub fn from_stable_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for PersistentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistentTypeId(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_from_slice() {
        let id = RecordId::new();
        assert_eq!(RecordId::from_slice(id.as_bytes()), Some(id));
        assert_eq!(RecordId::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn transaction_ids_are_unique() {
        let a = TransactionId::next();
        let b = TransactionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn persistent_type_id_is_stable() {
        let a = PersistentTypeId::from_stable_name("Book");
        let b = PersistentTypeId::from_stable_name("Book");
        let c = PersistentTypeId::from_stable_name("Author");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zone_named_uses_name_as_id() {
        let zone = Zone::named("archive");
        assert_eq!(zone.id().as_str(), "archive");
        assert_eq!(zone.name(), "archive");
    }
}
