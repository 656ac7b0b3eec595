//! Core identifier types.

use crate::error::{DirResult, DirectoryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a directory entry.
///
/// Entry ids are 128-bit random identifiers that are:
/// - Unique within a partition
/// - Assigned once at entry creation
/// - Never reused after deletion
///
/// The distinguished [`EntryId::ROOT`] value is the synthetic parent of all
/// suffix (top-level) entries and never identifies a stored entry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId([u8; 16]);

impl EntryId {
    /// The synthetic root identifier (the nil UUID).
    pub const ROOT: EntryId = EntryId([0u8; 16]);

    /// Creates a new random entry id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Creates an entry id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates an entry id from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Creates an entry id from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 16 {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Returns whether this is the synthetic root identifier.
    #[must_use]
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.to_uuid())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<EntryId> for Uuid {
    fn from(id: EntryId) -> Self {
        id.to_uuid()
    }
}

/// Change sequence number.
///
/// A Csn totally orders changes for replication: later changes compare
/// greater. The ordering is timestamp first, then per-timestamp change
/// count, then the originating replica id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Csn {
    timestamp_ms: u64,
    change_count: u32,
    replica_id: u32,
}

impl Csn {
    /// Creates a Csn from its components.
    #[must_use]
    pub const fn new(timestamp_ms: u64, change_count: u32, replica_id: u32) -> Self {
        Self {
            timestamp_ms,
            change_count,
            replica_id,
        }
    }

    /// Returns the millisecond timestamp component.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Returns the per-timestamp change count.
    #[must_use]
    pub const fn change_count(&self) -> u32 {
        self.change_count
    }

    /// Returns the originating replica id.
    #[must_use]
    pub const fn replica_id(&self) -> u32 {
        self.replica_id
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}#{:06x}#{:03x}",
            self.timestamp_ms, self.change_count, self.replica_id
        )
    }
}

impl FromStr for Csn {
    type Err = DirectoryError;

    fn from_str(s: &str) -> DirResult<Self> {
        let mut parts = s.split('#');
        let (Some(ts), Some(count), Some(replica), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DirectoryError::codec(format!("malformed Csn: {s}")));
        };
        let parse = |field: &str| {
            u64::from_str_radix(field, 16)
                .map_err(|_| DirectoryError::codec(format!("malformed Csn component: {field}")))
        };
        Ok(Self {
            timestamp_ms: parse(ts)?,
            change_count: parse(count)? as u32,
            replica_id: parse(replica)? as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }

    #[test]
    fn root_is_nil() {
        assert!(EntryId::ROOT.is_root());
        assert!(!EntryId::new().is_root());
        assert_eq!(EntryId::ROOT.to_uuid(), Uuid::nil());
    }

    #[test]
    fn from_slice_length_checked() {
        assert!(EntryId::from_slice(&[0u8; 16]).is_some());
        assert!(EntryId::from_slice(&[0u8; 15]).is_none());
        assert!(EntryId::from_slice(&[0u8; 17]).is_none());
    }

    #[test]
    fn csn_ordering() {
        let early = Csn::new(100, 5, 9);
        let later_ts = Csn::new(101, 0, 0);
        let later_count = Csn::new(100, 6, 0);

        assert!(early < later_ts);
        assert!(early < later_count);
    }

    #[test]
    fn csn_display_roundtrip() {
        let csn = Csn::new(0x1234, 7, 3);
        let parsed: Csn = csn.to_string().parse().unwrap();
        assert_eq!(parsed, csn);
    }

    #[test]
    fn csn_rejects_malformed() {
        assert!("nope".parse::<Csn>().is_err());
        assert!("1#2".parse::<Csn>().is_err());
        assert!("1#2#3#4".parse::<Csn>().is_err());
        assert!("xyz#2#3".parse::<Csn>().is_err());
    }
}
