//! The hierarchy index key: a parent id plus Rdn components.

use crate::error::{DirResult, DirectoryError};
use crate::name::Rdn;
use crate::table::{Comparator, Datum};
use crate::types::EntryId;
use std::cmp::Ordering;

/// Key of the hierarchy (Rdn) index.
///
/// An entry is keyed by its parent's id and its own Rdn components.
/// Suffix entries are keyed by [`EntryId::ROOT`] and carry every component
/// of the suffix Dn; all other entries carry exactly one component. The
/// index is unique in both directions: it is the authority on where an
/// entry sits in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentIdAndRdn {
    parent_id: EntryId,
    rdns: Vec<Rdn>,
}

impl ParentIdAndRdn {
    /// Creates a key from a parent id and Rdn components.
    #[must_use]
    pub fn new(parent_id: EntryId, rdns: Vec<Rdn>) -> Self {
        Self { parent_id, rdns }
    }

    /// Creates the usual single-component key.
    #[must_use]
    pub fn single(parent_id: EntryId, rdn: Rdn) -> Self {
        Self {
            parent_id,
            rdns: vec![rdn],
        }
    }

    /// Returns the parent entry id.
    #[must_use]
    pub fn parent_id(&self) -> EntryId {
        self.parent_id
    }

    /// Returns the Rdn components, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }
}

impl PartialOrd for ParentIdAndRdn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParentIdAndRdn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parent_id
            .cmp(&other.parent_id)
            .then_with(|| self.rdns.len().cmp(&other.rdns.len()))
            .then_with(|| self.rdns.cmp(&other.rdns))
    }
}

fn push_str(buf: &mut Vec<u8>, s: &str) -> DirResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| DirectoryError::codec("Rdn component longer than 65535 bytes"))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str<'a>(bytes: &mut &'a [u8]) -> DirResult<&'a str> {
    if bytes.len() < 2 {
        return Err(DirectoryError::codec("truncated Rdn component length"));
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    if bytes.len() < 2 + len {
        return Err(DirectoryError::codec("truncated Rdn component"));
    }
    let s = std::str::from_utf8(&bytes[2..2 + len])
        .map_err(|_| DirectoryError::codec("Rdn component is not valid UTF-8"))?;
    *bytes = &bytes[2 + len..];
    Ok(s)
}

impl Datum for ParentIdAndRdn {
    fn encode(&self) -> DirResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(18 + self.rdns.len() * 16);
        buf.extend_from_slice(self.parent_id.as_bytes());
        let count = u16::try_from(self.rdns.len())
            .map_err(|_| DirectoryError::codec("too many Rdn components"))?;
        buf.extend_from_slice(&count.to_be_bytes());
        for rdn in &self.rdns {
            push_str(&mut buf, rdn.attr())?;
            push_str(&mut buf, rdn.value())?;
        }
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        if bytes.len() < 18 {
            return Err(DirectoryError::codec("truncated hierarchy key"));
        }
        let parent_id = EntryId::from_slice(&bytes[..16])
            .ok_or_else(|| DirectoryError::codec("bad parent id in hierarchy key"))?;
        let count = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
        let mut rest = &bytes[18..];
        let mut rdns = Vec::with_capacity(count);
        for _ in 0..count {
            let attr = read_str(&mut rest)?;
            let value = read_str(&mut rest)?;
            rdns.push(Rdn::new(attr, value)?);
        }
        if !rest.is_empty() {
            return Err(DirectoryError::codec("trailing bytes in hierarchy key"));
        }
        Ok(Self { parent_id, rdns })
    }
}

/// Orders hierarchy keys by parent id, then component count, then
/// components. The byte encoding is not order preserving, so the index
/// must carry this comparator explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentIdAndRdnComparator;

impl Comparator<ParentIdAndRdn> for ParentIdAndRdnComparator {
    fn compare(&self, a: &ParentIdAndRdn, b: &ParentIdAndRdn) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rdn(s: &str) -> Rdn {
        Rdn::parse(s).unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let key = ParentIdAndRdn::new(
            EntryId::from_bytes([7; 16]),
            vec![rdn("ou=people"), rdn("dc=example")],
        );
        let decoded = ParentIdAndRdn::decode(&key.encode().unwrap()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn decode_rejects_truncation() {
        let key = ParentIdAndRdn::single(EntryId::from_bytes([7; 16]), rdn("cn=a"));
        let bytes = key.encode().unwrap();
        assert!(ParentIdAndRdn::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(ParentIdAndRdn::decode(&bytes[..10]).is_err());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let key = ParentIdAndRdn::single(EntryId::from_bytes([7; 16]), rdn("cn=a"));
        let mut bytes = key.encode().unwrap();
        bytes.push(0);
        assert!(ParentIdAndRdn::decode(&bytes).is_err());
    }

    #[test]
    fn order_groups_by_parent_first() {
        let p1 = EntryId::from_bytes([1; 16]);
        let p2 = EntryId::from_bytes([2; 16]);

        let a = ParentIdAndRdn::single(p1, rdn("cn=z"));
        let b = ParentIdAndRdn::single(p2, rdn("cn=a"));
        assert!(a < b);
    }

    #[test]
    fn shorter_component_lists_sort_first() {
        let p = EntryId::from_bytes([1; 16]);
        let short = ParentIdAndRdn::single(p, rdn("cn=z"));
        let long = ParentIdAndRdn::new(p, vec![rdn("cn=a"), rdn("dc=b")]);
        assert!(short < long);
    }
}
