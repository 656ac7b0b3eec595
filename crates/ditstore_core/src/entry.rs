//! Directory entries and attributes.

use crate::error::{DirResult, DirectoryError};
use crate::name::Dn;
use crate::types::Csn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known attribute and index identifiers.
pub mod oids {
    /// The objectClass attribute (multi-valued, required on every entry).
    pub const OBJECT_CLASS: &str = "2.5.4.0";
    /// The aliasedObjectName attribute carried by alias entries.
    pub const ALIASED_OBJECT_NAME: &str = "2.5.4.1";
    /// The entryCSN operational attribute.
    pub const ENTRY_CSN: &str = "1.3.6.1.4.1.4203.666.1.7";
    /// The entryUUID operational attribute.
    pub const ENTRY_UUID: &str = "1.3.6.1.1.16.4";
    /// Operational attribute recording the parent entry id, injected into
    /// every stored entry by the execution manager.
    pub const ENTRY_PARENT_ID: &str = "1.3.6.1.4.1.18060.0.4.1.2.51";

    /// System index: parent-id + Rdn hierarchy index.
    pub const RDN_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.50";
    /// System index: attribute presence.
    pub const PRESENCE_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.3";
    /// System index: parent id to direct children.
    pub const ONE_LEVEL_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.4";
    /// System index: ancestor id to every entry in its subtree.
    pub const SUB_LEVEL_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.43";
    /// System index: alias target Dn to alias entry id.
    pub const ALIAS_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.7";
    /// System index: ancestor id to alias target id, one-level scope.
    pub const ONE_ALIAS_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.5";
    /// System index: ancestor id to alias target id, subtree scope.
    pub const SUB_ALIAS_INDEX: &str = "1.3.6.1.4.1.18060.0.4.1.2.6";

    /// The objectClass value marking an entry as an alias.
    pub const ALIAS_OBJECT_CLASS: &str = "alias";
}

/// One attribute value.
///
/// Values are byte strings; directory string syntaxes are stored as UTF-8.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value(Vec<u8>);

impl Value {
    /// Creates a value from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the value as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Value({s:?})"),
            None => write!(f, "Value({} bytes)", self.0.len()),
        }
    }
}

/// An attribute: an identifier plus an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    oid: String,
    values: Vec<Value>,
}

impl Attribute {
    /// Creates an empty attribute.
    #[must_use]
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            values: Vec::new(),
        }
    }

    /// Creates an attribute with the given values.
    #[must_use]
    pub fn with_values<V: Into<Value>>(oid: impl Into<String>, values: Vec<V>) -> Self {
        Self {
            oid: oid.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the attribute identifier.
    #[must_use]
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Returns the values in insertion order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the first value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the attribute has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns whether the exact value is present.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.values.contains(value)
    }

    /// Appends a value, skipping an exact duplicate.
    pub fn add_value(&mut self, value: Value) {
        if !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    /// Removes an exact value. Returns `true` if it was present.
    pub fn remove_value(&mut self, value: &Value) -> bool {
        let before = self.values.len();
        self.values.retain(|v| v != value);
        self.values.len() != before
    }
}

/// A directory entry: a Dn plus an ordered collection of attributes.
///
/// The master table is the sole owner of stored entries; copies handed out
/// by lookups are marked detached and must never be fed back into the
/// modification path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
    #[serde(skip)]
    detached: bool,
}

impl Entry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Vec::new(),
            detached: false,
        }
    }

    /// Returns the entry's Dn.
    #[must_use]
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Returns the attributes in insertion order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns the attribute with the given identifier.
    #[must_use]
    pub fn get(&self, oid: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.oid() == oid)
    }

    /// Returns the first value of an attribute as UTF-8 text.
    #[must_use]
    pub fn first_str(&self, oid: &str) -> Option<&str> {
        self.get(oid).and_then(|a| a.first()).and_then(Value::as_str)
    }

    /// Replaces or appends an attribute wholesale.
    pub fn put_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.oid() == attribute.oid())
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Adds a single value, creating the attribute if needed.
    pub fn add_value(&mut self, oid: &str, value: Value) {
        match self.attributes.iter_mut().find(|a| a.oid() == oid) {
            Some(attr) => attr.add_value(value),
            None => {
                let mut attr = Attribute::new(oid);
                attr.add_value(value);
                self.attributes.push(attr);
            }
        }
    }

    /// Removes an attribute entirely. Returns it if it was present.
    pub fn remove_attribute(&mut self, oid: &str) -> Option<Attribute> {
        let pos = self.attributes.iter().position(|a| a.oid() == oid)?;
        Some(self.attributes.remove(pos))
    }

    /// Removes a single value; drops the attribute once empty.
    ///
    /// Returns `true` if the value was present.
    pub fn remove_value(&mut self, oid: &str, value: &Value) -> bool {
        let Some(attr) = self.attributes.iter_mut().find(|a| a.oid() == oid) else {
            return false;
        };
        let removed = attr.remove_value(value);
        if attr.is_empty() {
            self.remove_attribute(oid);
        }
        removed
    }

    /// Returns the entry's Csn, parsed from the entryCSN attribute.
    #[must_use]
    pub fn csn(&self) -> Option<Csn> {
        self.first_str(oids::ENTRY_CSN)?.parse().ok()
    }

    /// Returns the entryUUID attribute value.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.first_str(oids::ENTRY_UUID)
    }

    /// Returns whether the entry carries the alias object class.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.get(oids::OBJECT_CLASS).is_some_and(|a| {
            a.values()
                .iter()
                .filter_map(Value::as_str)
                .any(|v| v.eq_ignore_ascii_case(oids::ALIAS_OBJECT_CLASS))
        })
    }

    /// Parses the alias target Dn from the aliasedObjectName attribute.
    pub fn alias_target(&self) -> DirResult<Option<Dn>> {
        match self.first_str(oids::ALIASED_OBJECT_NAME) {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Dn::parse(s).map(Some).map_err(|_| {
                DirectoryError::schema_violation(format!("malformed alias target: {s}"))
            }),
        }
    }

    /// Marks this copy as detached from the master table.
    pub fn mark_detached(&mut self) {
        self.detached = true;
    }

    /// Returns whether this is a detached lookup copy.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Entry {
        Entry::new(Dn::parse("cn=alice,dc=example").unwrap())
    }

    #[test]
    fn add_and_get_values() {
        let mut e = entry();
        e.add_value("2.5.4.3", Value::from("alice"));
        e.add_value("2.5.4.3", Value::from("ally"));

        let attr = e.get("2.5.4.3").unwrap();
        assert_eq!(attr.len(), 2);
        assert_eq!(attr.first().unwrap().as_str(), Some("alice"));
    }

    #[test]
    fn add_value_skips_exact_duplicate() {
        let mut e = entry();
        e.add_value("2.5.4.3", Value::from("alice"));
        e.add_value("2.5.4.3", Value::from("alice"));
        assert_eq!(e.get("2.5.4.3").unwrap().len(), 1);
    }

    #[test]
    fn remove_last_value_drops_attribute() {
        let mut e = entry();
        e.add_value("2.5.4.3", Value::from("alice"));
        assert!(e.remove_value("2.5.4.3", &Value::from("alice")));
        assert!(e.get("2.5.4.3").is_none());
    }

    #[test]
    fn put_attribute_replaces() {
        let mut e = entry();
        e.add_value("2.5.4.3", Value::from("alice"));
        e.put_attribute(Attribute::with_values("2.5.4.3", vec!["bob"]));
        assert_eq!(e.get("2.5.4.3").unwrap().first().unwrap().as_str(), Some("bob"));
    }

    #[test]
    fn alias_detection_case_insensitive() {
        let mut e = entry();
        e.add_value(oids::OBJECT_CLASS, Value::from("Alias"));
        assert!(e.is_alias());
    }

    #[test]
    fn alias_target_parsing() {
        let mut e = entry();
        assert_eq!(e.alias_target().unwrap(), None);

        e.add_value(oids::ALIASED_OBJECT_NAME, Value::from("cn=Bob,dc=Example"));
        let target = e.alias_target().unwrap().unwrap();
        assert_eq!(target.to_string(), "cn=bob,dc=example");
    }

    #[test]
    fn csn_accessor() {
        let mut e = entry();
        assert!(e.csn().is_none());
        e.add_value(oids::ENTRY_CSN, Value::from(Csn::new(5, 0, 1).to_string()));
        assert_eq!(e.csn(), Some(Csn::new(5, 0, 1)));
    }

    #[test]
    fn detached_flag_not_serialized() {
        let mut e = entry();
        e.mark_detached();

        let mut buf = Vec::new();
        ciborium::into_writer(&e, &mut buf).unwrap();
        let decoded: Entry = ciborium::from_reader(buf.as_slice()).unwrap();
        assert!(!decoded.is_detached());
    }
}
