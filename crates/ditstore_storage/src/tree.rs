//! Sorted byte-level tree with pluggable comparators.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A byte-level comparator supplied by the owning layer.
///
/// The comparator defines the total order of a tree's keys (or of the
/// duplicate values under one key). Implementations typically check byte
/// equality first and only fall back to a domain-level comparison on
/// mismatch, since some domain comparisons are expensive.
pub type ByteCompare = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Configuration for a tree: its comparators and duplicate policy.
#[derive(Clone)]
pub struct TreeConfig {
    /// Comparator defining key order.
    pub key_compare: ByteCompare,
    /// Comparator defining the order of duplicate values under one key.
    pub value_compare: ByteCompare,
    /// Whether the tree allows multiple values per key.
    pub allows_duplicates: bool,
}

impl TreeConfig {
    /// Creates a configuration with explicit comparators.
    #[must_use]
    pub fn new(
        key_compare: ByteCompare,
        value_compare: ByteCompare,
        allows_duplicates: bool,
    ) -> Self {
        Self {
            key_compare,
            value_compare,
            allows_duplicates,
        }
    }

    /// Creates a configuration ordering keys and values by raw byte order.
    #[must_use]
    pub fn byte_ordered(allows_duplicates: bool) -> Self {
        let cmp: ByteCompare = Arc::new(|a: &[u8], b: &[u8]| a.cmp(b));
        Self {
            key_compare: Arc::clone(&cmp),
            value_compare: cmp,
            allows_duplicates,
        }
    }
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("allows_duplicates", &self.allows_duplicates)
            .finish_non_exhaustive()
    }
}

/// One key and its ordered value set.
#[derive(Debug, Clone)]
pub struct Node {
    key: Vec<u8>,
    values: Vec<Vec<u8>>,
}

impl Node {
    /// Returns the node's key bytes.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the node's values in value-comparator order.
    ///
    /// Non-duplicate trees hold exactly one value per node.
    #[must_use]
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }
}

/// An ordered mapping from byte keys to one or more byte values.
///
/// `TreeData` is the unit of storage handed out by the environment. It is
/// cheap to share behind an [`Arc`] and cloned copy-on-write by write
/// transactions, so a clone taken at any point is a stable snapshot.
#[derive(Clone)]
pub struct TreeData {
    config: TreeConfig,
    nodes: Vec<Node>,
}

impl TreeData {
    /// Creates an empty tree with the given configuration.
    #[must_use]
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
        }
    }

    /// Returns the tree's configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Returns whether the tree allows duplicate values per key.
    #[must_use]
    pub fn allows_duplicates(&self) -> bool {
        self.config.allows_duplicates
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the total number of (key, value) pairs, counting duplicates.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.nodes.iter().map(|n| n.values.len()).sum()
    }

    /// Returns whether the tree holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node at the given position, if any.
    #[must_use]
    pub fn node(&self, position: usize) -> Option<&Node> {
        self.nodes.get(position)
    }

    /// Locates a key: `Ok(position)` on an exact match, `Err(position)`
    /// with the insertion point otherwise.
    pub fn seek(&self, key: &[u8]) -> Result<usize, usize> {
        let cmp = &self.config.key_compare;
        self.nodes.binary_search_by(|n| cmp(&n.key, key))
    }

    /// Returns the position of the first key greater than or equal to `key`.
    #[must_use]
    pub fn seek_ge(&self, key: &[u8]) -> Option<usize> {
        let pos = match self.seek(key) {
            Ok(pos) | Err(pos) => pos,
        };
        (pos < self.nodes.len()).then_some(pos)
    }

    /// Returns the position of the last key less than or equal to `key`.
    #[must_use]
    pub fn seek_le(&self, key: &[u8]) -> Option<usize> {
        match self.seek(key) {
            Ok(pos) => Some(pos),
            Err(0) => None,
            Err(pos) => Some(pos - 1),
        }
    }

    /// Returns the node for an exact key match.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Node> {
        self.seek(key).ok().map(|pos| &self.nodes[pos])
    }

    /// Returns the number of values stored under `key`.
    #[must_use]
    pub fn count_key(&self, key: &[u8]) -> usize {
        self.get(key).map_or(0, |n| n.values.len())
    }

    /// Returns whether the exact (key, value) pair is present.
    ///
    /// The value is located with a positioned search within the key's value
    /// set, never by scanning.
    #[must_use]
    pub fn has_pair(&self, key: &[u8], value: &[u8]) -> bool {
        self.get(key)
            .is_some_and(|n| self.seek_value(n, value).is_ok())
    }

    /// Inserts a (key, value) pair.
    ///
    /// For duplicate trees an already-present pair is left untouched and
    /// `false` is returned (no-duplicate-data semantics). For non-duplicate
    /// trees an existing value for the key is overwritten.
    ///
    /// Returns `true` if the tree changed.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.seek(key) {
            Ok(pos) => {
                if self.config.allows_duplicates {
                    let vpos = self.seek_value(&self.nodes[pos], value);
                    match vpos {
                        Ok(_) => false,
                        Err(vpos) => {
                            self.nodes[pos].values.insert(vpos, value.to_vec());
                            true
                        }
                    }
                } else {
                    self.nodes[pos].values = vec![value.to_vec()];
                    true
                }
            }
            Err(pos) => {
                self.nodes.insert(
                    pos,
                    Node {
                        key: key.to_vec(),
                        values: vec![value.to_vec()],
                    },
                );
                true
            }
        }
    }

    /// Removes a key and every value stored under it.
    ///
    /// Returns `true` if the key was present.
    pub fn remove_key(&mut self, key: &[u8]) -> bool {
        match self.seek(key) {
            Ok(pos) => {
                self.nodes.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes exactly one (key, value) pair.
    ///
    /// The pair is located with a positioned search on both key and value,
    /// so other duplicates under the same key are never disturbed. The node
    /// is dropped once its last value is removed.
    ///
    /// Returns `true` if the pair was present.
    pub fn remove_pair(&mut self, key: &[u8], value: &[u8]) -> bool {
        let Ok(pos) = self.seek(key) else {
            return false;
        };
        let Ok(vpos) = self.seek_value(&self.nodes[pos], value) else {
            return false;
        };
        self.nodes[pos].values.remove(vpos);
        if self.nodes[pos].values.is_empty() {
            self.nodes.remove(pos);
        }
        true
    }

    /// Removes every pair from the tree.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Locates a value within a node's value set: `Ok(position)` on an
    /// exact match, `Err(position)` with the insertion point otherwise.
    pub fn seek_value(&self, node: &Node, value: &[u8]) -> Result<usize, usize> {
        let cmp = &self.config.value_compare;
        node.values.binary_search_by(|v| cmp(v, value))
    }
}

impl fmt::Debug for TreeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeData")
            .field("keys", &self.key_count())
            .field("pairs", &self.pair_count())
            .field("allows_duplicates", &self.allows_duplicates())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dup_tree() -> TreeData {
        TreeData::new(TreeConfig::byte_ordered(true))
    }

    fn plain_tree() -> TreeData {
        TreeData::new(TreeConfig::byte_ordered(false))
    }

    #[test]
    fn insert_and_get() {
        let mut tree = plain_tree();
        assert!(tree.insert(b"b", b"2"));
        assert!(tree.insert(b"a", b"1"));

        let node = tree.get(b"a").unwrap();
        assert_eq!(node.values(), &[b"1".to_vec()]);
        assert_eq!(tree.key_count(), 2);
    }

    #[test]
    fn keys_stay_sorted() {
        let mut tree = plain_tree();
        for key in [b"m", b"a", b"z", b"c"] {
            tree.insert(key, b"v");
        }
        let keys: Vec<&[u8]> = (0..tree.key_count())
            .map(|i| tree.node(i).unwrap().key())
            .collect();
        assert_eq!(keys, vec![b"a" as &[u8], b"c", b"m", b"z"]);
    }

    #[test]
    fn non_duplicate_overwrites() {
        let mut tree = plain_tree();
        tree.insert(b"k", b"old");
        tree.insert(b"k", b"new");

        assert_eq!(tree.count_key(b"k"), 1);
        assert_eq!(tree.get(b"k").unwrap().values(), &[b"new".to_vec()]);
    }

    #[test]
    fn duplicate_values_sorted_and_deduplicated() {
        let mut tree = dup_tree();
        assert!(tree.insert(b"k", b"b"));
        assert!(tree.insert(b"k", b"a"));
        assert!(!tree.insert(b"k", b"a"));

        assert_eq!(tree.count_key(b"k"), 2);
        assert_eq!(
            tree.get(b"k").unwrap().values(),
            &[b"a".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn remove_pair_leaves_other_duplicates() {
        let mut tree = dup_tree();
        tree.insert(b"k", b"a");
        tree.insert(b"k", b"b");

        assert!(tree.remove_pair(b"k", b"a"));
        assert!(!tree.remove_pair(b"k", b"a"));
        assert_eq!(tree.get(b"k").unwrap().values(), &[b"b".to_vec()]);
    }

    #[test]
    fn remove_last_pair_drops_node() {
        let mut tree = dup_tree();
        tree.insert(b"k", b"a");
        assert!(tree.remove_pair(b"k", b"a"));
        assert!(tree.get(b"k").is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_key_drops_all_duplicates() {
        let mut tree = dup_tree();
        tree.insert(b"k", b"a");
        tree.insert(b"k", b"b");
        assert!(tree.remove_key(b"k"));
        assert_eq!(tree.pair_count(), 0);
    }

    #[test]
    fn seek_ge_and_le() {
        let mut tree = plain_tree();
        for key in [b"b", b"d", b"f"] {
            tree.insert(key, b"v");
        }

        assert_eq!(tree.seek_ge(b"c"), Some(1));
        assert_eq!(tree.seek_ge(b"d"), Some(1));
        assert_eq!(tree.seek_ge(b"g"), None);

        assert_eq!(tree.seek_le(b"c"), Some(0));
        assert_eq!(tree.seek_le(b"b"), Some(0));
        assert_eq!(tree.seek_le(b"a"), None);
    }

    #[test]
    fn has_pair_exact() {
        let mut tree = dup_tree();
        tree.insert(b"k", b"a");
        assert!(tree.has_pair(b"k", b"a"));
        assert!(!tree.has_pair(b"k", b"b"));
        assert!(!tree.has_pair(b"x", b"a"));
    }

    #[test]
    fn custom_comparator_controls_order() {
        // Reverse byte order.
        let rev: ByteCompare = Arc::new(|a: &[u8], b: &[u8]| b.cmp(a));
        let config = TreeConfig::new(rev, Arc::new(|a: &[u8], b: &[u8]| a.cmp(b)), false);
        let mut tree = TreeData::new(config);

        tree.insert(b"a", b"v");
        tree.insert(b"z", b"v");

        assert_eq!(tree.node(0).unwrap().key(), b"z");
        assert_eq!(tree.node(1).unwrap().key(), b"a");
    }

    #[test]
    fn pair_count_counts_duplicates() {
        let mut tree = dup_tree();
        tree.insert(b"k", b"a");
        tree.insert(b"k", b"b");
        tree.insert(b"m", b"a");
        assert_eq!(tree.key_count(), 2);
        assert_eq!(tree.pair_count(), 3);
    }
}
