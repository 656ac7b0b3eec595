//! A minimal attribute-type registry.
//!
//! The registry resolves attribute names to identifiers and answers the
//! questions index maintenance needs: is a value human readable (and thus
//! normalized and compared case-insensitively), and is the attribute
//! single valued.

use crate::entry::{oids, Value};
use crate::table::{CaseIgnoreComparator, Comparator, NaturalComparator};
use std::collections::HashMap;
use std::sync::Arc;

/// Description of one attribute type.
#[derive(Debug, Clone)]
pub struct AttributeType {
    oid: String,
    names: Vec<String>,
    single_valued: bool,
    human_readable: bool,
}

impl AttributeType {
    /// Creates an attribute type description.
    #[must_use]
    pub fn new(
        oid: impl Into<String>,
        names: &[&str],
        single_valued: bool,
        human_readable: bool,
    ) -> Self {
        Self {
            oid: oid.into(),
            names: names.iter().map(|n| n.to_ascii_lowercase()).collect(),
            single_valued,
            human_readable,
        }
    }

    /// Returns the attribute's identifier.
    #[must_use]
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Returns the attribute's names, lowercased.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns whether the attribute holds at most one value.
    #[must_use]
    pub fn is_single_valued(&self) -> bool {
        self.single_valued
    }

    /// Returns whether values are human-readable text.
    #[must_use]
    pub fn is_human_readable(&self) -> bool {
        self.human_readable
    }
}

/// An immutable registry of attribute types.
///
/// Built once when a partition opens and shared read-only afterwards, so
/// no locking is needed on lookup paths.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    by_oid: HashMap<String, AttributeType>,
    name_to_oid: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-loaded with the core attribute types.
    #[must_use]
    pub fn with_core_schema() -> Self {
        let mut registry = Self::new();
        for at in [
            AttributeType::new(oids::OBJECT_CLASS, &["objectClass"], false, true),
            AttributeType::new(oids::ALIASED_OBJECT_NAME, &["aliasedObjectName"], true, true),
            AttributeType::new(oids::ENTRY_CSN, &["entryCSN"], true, true),
            AttributeType::new(oids::ENTRY_UUID, &["entryUUID"], true, true),
            AttributeType::new("2.5.4.3", &["cn", "commonName"], false, true),
            AttributeType::new("2.5.4.4", &["sn", "surname"], false, true),
            AttributeType::new("2.5.4.11", &["ou", "organizationalUnitName"], false, true),
            AttributeType::new("0.9.2342.19200300.100.1.25", &["dc", "domainComponent"], true, true),
            AttributeType::new("0.9.2342.19200300.100.1.1", &["uid"], false, true),
            AttributeType::new("0.9.2342.19200300.100.1.3", &["mail"], false, true),
            AttributeType::new("2.5.4.13", &["description"], false, true),
            AttributeType::new("2.5.4.35", &["userPassword"], false, false),
        ] {
            registry.register(at);
        }
        registry
    }

    /// Registers an attribute type, replacing any previous registration of
    /// the same identifier.
    pub fn register(&mut self, at: AttributeType) {
        for name in at.names() {
            self.name_to_oid.insert(name.clone(), at.oid().to_string());
        }
        self.by_oid.insert(at.oid().to_string(), at);
    }

    /// Looks up an attribute type by identifier or by any of its names.
    #[must_use]
    pub fn attribute_type(&self, name_or_oid: &str) -> Option<&AttributeType> {
        if let Some(at) = self.by_oid.get(name_or_oid) {
            return Some(at);
        }
        let lowered = name_or_oid.to_ascii_lowercase();
        self.name_to_oid
            .get(&lowered)
            .and_then(|oid| self.by_oid.get(oid))
    }

    /// Resolves a name to its identifier; an unknown name resolves to
    /// itself so unregistered attributes still index consistently.
    #[must_use]
    pub fn resolve_oid(&self, name_or_oid: &str) -> String {
        self.attribute_type(name_or_oid)
            .map_or_else(|| name_or_oid.to_string(), |at| at.oid().to_string())
    }

    /// Returns whether the attribute holds at most one value. Unknown
    /// attributes are treated as multi-valued.
    #[must_use]
    pub fn is_single_valued(&self, name_or_oid: &str) -> bool {
        self.attribute_type(name_or_oid)
            .is_some_and(AttributeType::is_single_valued)
    }

    /// Returns whether the attribute's values are human-readable text.
    /// Unknown attributes default to human readable.
    #[must_use]
    pub fn is_human_readable(&self, name_or_oid: &str) -> bool {
        self.attribute_type(name_or_oid)
            .map_or(true, AttributeType::is_human_readable)
    }

    /// Normalizes a value for indexing: human-readable values are trimmed
    /// and case folded, binary values pass through unchanged.
    #[must_use]
    pub fn normalize_value(&self, name_or_oid: &str, value: &Value) -> Vec<u8> {
        if self.is_human_readable(name_or_oid) {
            if let Some(s) = value.as_str() {
                return s.trim().to_ascii_lowercase().into_bytes();
            }
        }
        value.as_bytes().to_vec()
    }

    /// Returns the comparator governing an attribute's index keys.
    #[must_use]
    pub fn value_comparator(&self, name_or_oid: &str) -> Arc<dyn Comparator<Vec<u8>>> {
        if self.is_human_readable(name_or_oid) {
            Arc::new(CaseIgnoreComparator)
        } else {
            Arc::new(NaturalComparator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_case_insensitively() {
        let schema = SchemaRegistry::with_core_schema();
        assert_eq!(schema.resolve_oid("CN"), "2.5.4.3");
        assert_eq!(schema.resolve_oid("commonname"), "2.5.4.3");
        assert_eq!(schema.resolve_oid("2.5.4.3"), "2.5.4.3");
    }

    #[test]
    fn unknown_name_resolves_to_itself() {
        let schema = SchemaRegistry::with_core_schema();
        assert_eq!(schema.resolve_oid("1.2.3.4"), "1.2.3.4");
        assert!(!schema.is_single_valued("1.2.3.4"));
        assert!(schema.is_human_readable("1.2.3.4"));
    }

    #[test]
    fn single_valued_flags() {
        let schema = SchemaRegistry::with_core_schema();
        assert!(schema.is_single_valued("aliasedObjectName"));
        assert!(schema.is_single_valued("entryCSN"));
        assert!(!schema.is_single_valued("cn"));
    }

    #[test]
    fn normalization_respects_syntax() {
        let schema = SchemaRegistry::with_core_schema();
        assert_eq!(
            schema.normalize_value("cn", &Value::from("  Alice ")),
            b"alice".to_vec()
        );
        // userPassword is binary and passes through untouched
        assert_eq!(
            schema.normalize_value("userPassword", &Value::from(" Secret ")),
            b" Secret ".to_vec()
        );
    }

    #[test]
    fn registration_overrides() {
        let mut schema = SchemaRegistry::with_core_schema();
        schema.register(AttributeType::new("2.5.4.3", &["cn"], true, false));
        assert!(schema.is_single_valued("cn"));
        assert!(!schema.is_human_readable("cn"));
    }
}
