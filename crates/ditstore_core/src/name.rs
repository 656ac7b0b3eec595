//! Distinguished names and their components.

use crate::error::{DirResult, DirectoryError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One relative distinguished name component, stored in normalized form
/// (attribute type and value lowercased and trimmed).
///
/// The unescaped `type=value` subset of RFC 4514 is supported; escaping
/// belongs to the protocol front end.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rdn {
    attr: String,
    value: String,
}

impl Rdn {
    /// Creates a normalized Rdn from an attribute type and value.
    pub fn new(attr: impl AsRef<str>, value: impl AsRef<str>) -> DirResult<Self> {
        let attr = attr.as_ref().trim().to_ascii_lowercase();
        let value = value.as_ref().trim().to_ascii_lowercase();
        if attr.is_empty() || value.is_empty() {
            return Err(DirectoryError::invalid_dn(
                "Rdn attribute and value must be non-empty",
            ));
        }
        Ok(Self { attr, value })
    }

    /// Parses a `type=value` component.
    pub fn parse(component: &str) -> DirResult<Self> {
        let (attr, value) = component
            .split_once('=')
            .ok_or_else(|| DirectoryError::invalid_dn(format!("missing '=' in: {component}")))?;
        Self::new(attr, value)
    }

    /// Returns the normalized attribute type.
    #[must_use]
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Returns the normalized attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, self.value)
    }
}

/// A distinguished name: an ordered sequence of Rdns, leaf first.
///
/// `dn.rdns()[0]` is the entry's own Rdn; the last component is the one
/// closest to the directory root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// Parses a comma-separated Dn string, e.g. `ou=people,dc=example`.
    pub fn parse(s: &str) -> DirResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DirectoryError::invalid_dn("empty Dn"));
        }
        let rdns = s.split(',').map(Rdn::parse).collect::<DirResult<_>>()?;
        Ok(Self { rdns })
    }

    /// Creates a Dn from components, leaf first.
    pub fn from_rdns(rdns: Vec<Rdn>) -> DirResult<Self> {
        if rdns.is_empty() {
            return Err(DirectoryError::invalid_dn("empty Dn"));
        }
        Ok(Self { rdns })
    }

    /// Returns the components, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Returns the entry's own (leftmost) Rdn.
    #[must_use]
    pub fn rdn(&self) -> &Rdn {
        &self.rdns[0]
    }

    /// Returns the number of components.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    /// Returns the parent Dn, or `None` for a single-component Dn.
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.len() <= 1 {
            None
        } else {
            Some(Dn {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Returns whether `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Dn) -> bool {
        other.size() > self.size() && other.rdns[other.size() - self.size()..] == self.rdns[..]
    }

    /// Returns whether `self` equals `other` or is an ancestor of it.
    #[must_use]
    pub fn is_ancestor_of_or_equal(&self, other: &Dn) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Returns whether `self` is a strict descendant of `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Dn) -> bool {
        other.is_ancestor_of(self)
    }

    /// Returns the child Dn obtained by prepending `rdn` to `self`.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend_from_slice(&self.rdns);
        Dn { rdns }
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rdn in &self.rdns {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn parse_normalizes() {
        let parsed = dn(" OU=People , DC=Example ");
        assert_eq!(parsed.to_string(), "ou=people,dc=example");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Dn::parse("").is_err());
        assert!(Dn::parse("no-equals").is_err());
        assert!(Dn::parse("ou=,dc=example").is_err());
        assert!(Dn::parse("=x,dc=example").is_err());
    }

    #[test]
    fn rdn_is_leaf() {
        let parsed = dn("cn=alice,ou=people,dc=example");
        assert_eq!(parsed.rdn().to_string(), "cn=alice");
        assert_eq!(parsed.size(), 3);
    }

    #[test]
    fn parent_chain() {
        let parsed = dn("cn=alice,ou=people,dc=example");
        let parent = parsed.parent().unwrap();
        assert_eq!(parent.to_string(), "ou=people,dc=example");
        assert_eq!(parent.parent().unwrap().to_string(), "dc=example");
        assert!(parent.parent().unwrap().parent().is_none());
    }

    #[test]
    fn ancestry() {
        let suffix = dn("dc=example");
        let people = dn("ou=people,dc=example");
        let alice = dn("cn=alice,ou=people,dc=example");
        let other = dn("ou=people,dc=other");

        assert!(suffix.is_ancestor_of(&people));
        assert!(suffix.is_ancestor_of(&alice));
        assert!(people.is_ancestor_of(&alice));
        assert!(!people.is_ancestor_of(&suffix));
        assert!(!suffix.is_ancestor_of(&suffix));
        assert!(suffix.is_ancestor_of_or_equal(&suffix));
        assert!(!suffix.is_ancestor_of(&other));
        assert!(alice.is_descendant_of(&suffix));
    }

    #[test]
    fn child_builds_downward() {
        let suffix = dn("dc=example");
        let child = suffix.child(Rdn::new("ou", "People").unwrap());
        assert_eq!(child.to_string(), "ou=people,dc=example");
    }

    #[test]
    fn case_differences_compare_equal() {
        assert_eq!(dn("OU=A,DC=B"), dn("ou=a,dc=b"));
    }
}
