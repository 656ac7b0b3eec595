//! Typed tables over the byte-level storage trees.
//!
//! A [`Table`] pairs a key type and value type (both [`Datum`]) with the
//! comparators that define their order, and translates typed operations
//! into byte-level tree operations. Tables are stateless handles; all data
//! lives in the transaction's snapshot.

mod cursor;

pub use cursor::{KeyCursor, TableCursor, ValueCursor};

use crate::entry::Entry;
use crate::error::{DirResult, DirectoryError};
use crate::name::Dn;
use crate::types::{Csn, EntryId};
use crate::txn::WriteTransaction;
use ditstore_storage::{ByteCompare, TreeConfig, TreeView};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// Cap applied to range counts.
///
/// Range counts exist to let a query planner pick the most selective
/// candidate, and beyond a small bound the exact number no longer changes
/// the decision, so counting stops early.
pub const RANGE_COUNT_CAP: usize = 10;

/// A value that can be stored in a table.
///
/// Encoding must be deterministic: equal values produce equal bytes. Byte
/// order need not match domain order; tables carry explicit comparators
/// for that.
pub trait Datum: Sized {
    /// Encodes the value to bytes.
    fn encode(&self) -> DirResult<Vec<u8>>;

    /// Decodes a value from bytes.
    fn decode(bytes: &[u8]) -> DirResult<Self>;
}

impl Datum for EntryId {
    fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        EntryId::from_slice(bytes)
            .ok_or_else(|| DirectoryError::codec(format!("bad entry id length: {}", bytes.len())))
    }
}

impl Datum for String {
    fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DirectoryError::codec("string key is not valid UTF-8"))
    }
}

impl Datum for Vec<u8> {
    fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Datum for Csn {
    fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(self.to_string().into_bytes())
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| DirectoryError::codec("Csn bytes are not valid UTF-8"))?;
        s.parse()
    }
}

impl Datum for Dn {
    fn encode(&self) -> DirResult<Vec<u8>> {
        Ok(self.to_string().into_bytes())
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| DirectoryError::codec("Dn bytes are not valid UTF-8"))?;
        Dn::parse(s)
    }
}

impl Datum for Entry {
    fn encode(&self) -> DirResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| DirectoryError::codec(format!("entry encode failed: {e}")))?;
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> DirResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| DirectoryError::codec(format!("entry decode failed: {e}")))
    }
}

/// Defines a total order over a datum type.
pub trait Comparator<T>: Send + Sync {
    /// Compares two values.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Orders values by their natural [`Ord`] order.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalComparator;

impl<T: Ord> Comparator<T> for NaturalComparator {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Orders byte strings by their ASCII-case-folded form, falling back to
/// raw byte order for non-UTF-8 input.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseIgnoreComparator;

impl Comparator<Vec<u8>> for CaseIgnoreComparator {
    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        match (std::str::from_utf8(a), std::str::from_utf8(b)) {
            (Ok(x), Ok(y)) => x
                .trim()
                .bytes()
                .map(|c| c.to_ascii_lowercase())
                .cmp(y.trim().bytes().map(|c| c.to_ascii_lowercase())),
            _ => a.cmp(b),
        }
    }
}

impl Comparator<String> for CaseIgnoreComparator {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        CaseIgnoreComparator.compare(&a.as_bytes().to_vec(), &b.as_bytes().to_vec())
    }
}

/// Wraps a typed comparator as a byte-level one.
///
/// Byte equality is checked first so equal keys never pay for a decode;
/// on decode failure raw byte order keeps the order total. Keys written
/// through the owning table always decode.
fn byte_compare<T: Datum + 'static>(cmp: Arc<dyn Comparator<T>>) -> ByteCompare {
    Arc::new(move |a: &[u8], b: &[u8]| {
        if a == b {
            return Ordering::Equal;
        }
        match (T::decode(a), T::decode(b)) {
            (Ok(x), Ok(y)) => cmp.compare(&x, &y),
            _ => a.cmp(b),
        }
    })
}

/// A typed, ordered table.
///
/// The handle names a tree in the storage environment and carries the
/// comparators used to order it. A `None` value comparator means raw byte
/// order, which is correct for order-preserving encodings like
/// [`EntryId`].
pub struct Table<K, V> {
    name: String,
    key_cmp: Arc<dyn Comparator<K>>,
    value_cmp: Option<Arc<dyn Comparator<V>>>,
    allows_duplicates: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Datum + 'static, V: Datum + 'static> Table<K, V> {
    /// Creates a table handle.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        key_cmp: Arc<dyn Comparator<K>>,
        value_cmp: Option<Arc<dyn Comparator<V>>>,
        allows_duplicates: bool,
    ) -> Self {
        Self {
            name: name.into(),
            key_cmp,
            value_cmp,
            allows_duplicates,
            _marker: PhantomData,
        }
    }

    /// Returns the table's tree name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the table allows multiple values per key.
    #[must_use]
    pub fn allows_duplicates(&self) -> bool {
        self.allows_duplicates
    }

    fn tree_config(&self) -> TreeConfig {
        let value_compare = match &self.value_cmp {
            Some(cmp) => byte_compare(Arc::clone(cmp)),
            None => Arc::new(|a: &[u8], b: &[u8]| a.cmp(b)) as ByteCompare,
        };
        TreeConfig::new(
            byte_compare(Arc::clone(&self.key_cmp)),
            value_compare,
            self.allows_duplicates,
        )
    }

    /// Creates the backing tree if it does not already exist.
    pub fn create(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        if txn.has_tree(&self.name) {
            return Ok(());
        }
        txn.create_tree(&self.name, self.tree_config())
    }

    /// Returns whether any value is stored under `key`.
    pub fn has(&self, txn: &dyn TreeView, key: &K) -> DirResult<bool> {
        let tree = txn.tree(&self.name)?;
        Ok(tree.get(&key.encode()?).is_some())
    }

    /// Returns whether the exact (key, value) pair is present.
    pub fn has_pair(&self, txn: &dyn TreeView, key: &K, value: &V) -> DirResult<bool> {
        let tree = txn.tree(&self.name)?;
        Ok(tree.has_pair(&key.encode()?, &value.encode()?))
    }

    /// Returns whether any key greater than or equal to `key` exists.
    pub fn has_greater_or_equal(&self, txn: &dyn TreeView, key: &K) -> DirResult<bool> {
        let tree = txn.tree(&self.name)?;
        Ok(tree.seek_ge(&key.encode()?).is_some())
    }

    /// Returns whether any key less than or equal to `key` exists.
    pub fn has_less_or_equal(&self, txn: &dyn TreeView, key: &K) -> DirResult<bool> {
        let tree = txn.tree(&self.name)?;
        Ok(tree.seek_le(&key.encode()?).is_some())
    }

    /// Returns whether `key` holds any value greater than or equal to
    /// `value`.
    ///
    /// Only meaningful on duplicate tables; errors otherwise.
    pub fn has_greater_or_equal_pair(
        &self,
        txn: &dyn TreeView,
        key: &K,
        value: &V,
    ) -> DirResult<bool> {
        self.require_duplicates("has_greater_or_equal_pair")?;
        let tree = txn.tree(&self.name)?;
        let Some(node) = tree.get(&key.encode()?) else {
            return Ok(false);
        };
        Ok(match tree.seek_value(node, &value.encode()?) {
            Ok(_) => true,
            Err(pos) => pos < node.values().len(),
        })
    }

    /// Returns whether `key` holds any value less than or equal to `value`.
    ///
    /// Only meaningful on duplicate tables; errors otherwise.
    pub fn has_less_or_equal_pair(
        &self,
        txn: &dyn TreeView,
        key: &K,
        value: &V,
    ) -> DirResult<bool> {
        self.require_duplicates("has_less_or_equal_pair")?;
        let tree = txn.tree(&self.name)?;
        let Some(node) = tree.get(&key.encode()?) else {
            return Ok(false);
        };
        Ok(match tree.seek_value(node, &value.encode()?) {
            Ok(_) => true,
            Err(pos) => pos > 0,
        })
    }

    /// Returns the value stored under `key`.
    ///
    /// On a duplicate table this is the first value in value order.
    pub fn get(&self, txn: &dyn TreeView, key: &K) -> DirResult<Option<V>> {
        let tree = txn.tree(&self.name)?;
        match tree.get(&key.encode()?) {
            Some(node) => match node.values().first() {
                Some(bytes) => Ok(Some(V::decode(bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Stores a (key, value) pair.
    ///
    /// On a duplicate table an already-present pair is left untouched; on a
    /// non-duplicate table an existing value is overwritten.
    pub fn put(&self, txn: &mut WriteTransaction, key: &K, value: &V) -> DirResult<()> {
        let kb = key.encode()?;
        let vb = value.encode()?;
        let tree = txn.tree_mut(&self.name)?;
        tree.insert(&kb, &vb);
        Ok(())
    }

    /// Removes `key` and every value stored under it.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&self, txn: &mut WriteTransaction, key: &K) -> DirResult<bool> {
        let kb = key.encode()?;
        let tree = txn.tree_mut(&self.name)?;
        Ok(tree.remove_key(&kb))
    }

    /// Removes exactly one (key, value) pair, leaving other duplicates
    /// under the same key untouched.
    ///
    /// Returns `true` if the pair was present.
    pub fn remove_pair(&self, txn: &mut WriteTransaction, key: &K, value: &V) -> DirResult<bool> {
        let kb = key.encode()?;
        let vb = value.encode()?;
        let tree = txn.tree_mut(&self.name)?;
        Ok(tree.remove_pair(&kb, &vb))
    }

    /// Removes every pair from the table.
    pub fn clear(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        let tree = txn.tree_mut(&self.name)?;
        tree.clear();
        Ok(())
    }

    /// Returns the total number of (key, value) pairs.
    pub fn count(&self, txn: &dyn TreeView) -> DirResult<usize> {
        Ok(txn.tree(&self.name)?.pair_count())
    }

    /// Returns the number of values stored under `key`.
    pub fn count_key(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        let tree = txn.tree(&self.name)?;
        Ok(tree.count_key(&key.encode()?))
    }

    /// Counts pairs under keys strictly greater than `key`, capped at
    /// [`RANGE_COUNT_CAP`].
    pub fn greater_than_count(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        let tree = txn.tree(&self.name)?;
        let start = match tree.seek(&key.encode()?) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        };
        let mut count = 0;
        let mut pos = start;
        while count < RANGE_COUNT_CAP {
            let Some(node) = tree.node(pos) else {
                break;
            };
            count = (count + node.values().len()).min(RANGE_COUNT_CAP);
            pos += 1;
        }
        Ok(count)
    }

    /// Counts pairs under keys strictly less than `key`, capped at
    /// [`RANGE_COUNT_CAP`].
    pub fn less_than_count(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        let tree = txn.tree(&self.name)?;
        let end = match tree.seek(&key.encode()?) {
            Ok(pos) | Err(pos) => pos,
        };
        let mut count = 0;
        for pos in (0..end).rev() {
            if count >= RANGE_COUNT_CAP {
                break;
            }
            let Some(node) = tree.node(pos) else {
                break;
            };
            count = (count + node.values().len()).min(RANGE_COUNT_CAP);
        }
        Ok(count)
    }

    /// Opens a cursor over the whole table.
    ///
    /// The cursor sees the transaction's snapshot at open time; later
    /// writes in the same transaction do not move it.
    pub fn cursor(&self, txn: &dyn TreeView) -> DirResult<TableCursor<K, V>> {
        self.require_active(txn)?;
        Ok(TableCursor::new(txn.tree(&self.name)?))
    }

    /// Opens a cursor scoped to the duplicate values of one key.
    pub fn key_cursor(&self, txn: &dyn TreeView, key: &K) -> DirResult<KeyCursor<K, V>> {
        self.require_active(txn)?;
        self.require_duplicates("key_cursor")?;
        let tree = txn.tree(&self.name)?;
        let kb = key.encode()?;
        Ok(KeyCursor::new(tree, &kb))
    }

    /// Opens a cursor over the values of one key, valid on both duplicate
    /// and non-duplicate tables.
    pub fn value_cursor(&self, txn: &dyn TreeView, key: &K) -> DirResult<ValueCursor<V>> {
        self.require_active(txn)?;
        let tree = txn.tree(&self.name)?;
        let values = match tree.get(&key.encode()?) {
            Some(node) => node.values().to_vec(),
            None => Vec::new(),
        };
        Ok(ValueCursor::new(values))
    }

    fn require_duplicates(&self, op: &str) -> DirResult<()> {
        if self.allows_duplicates {
            Ok(())
        } else {
            Err(DirectoryError::unsupported(format!(
                "{op} requires a duplicate-enabled table: {}",
                self.name
            )))
        }
    }

    fn require_active(&self, txn: &dyn TreeView) -> DirResult<()> {
        if txn.is_active() {
            Ok(())
        } else {
            Err(DirectoryError::invalid_operation(
                "cursor requires an active transaction",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::tests::write_env;
    use proptest::prelude::*;

    fn string_table(dups: bool) -> Table<String, EntryId> {
        Table::new("t", Arc::new(CaseIgnoreComparator), None, dups)
    }

    #[test]
    fn put_get_remove() {
        let (env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();

        let id = EntryId::new();
        table.put(&mut txn, &"cn".to_string(), &id).unwrap();
        assert_eq!(table.get(&txn, &"cn".to_string()).unwrap(), Some(id));
        assert!(table.remove(&mut txn, &"cn".to_string()).unwrap());
        assert_eq!(table.get(&txn, &"cn".to_string()).unwrap(), None);
        drop(env);
    }

    #[test]
    fn case_ignore_keys_collide() {
        let (_env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();

        let id = EntryId::new();
        table.put(&mut txn, &"Alice".to_string(), &id).unwrap();
        assert!(table.has(&txn, &"alice".to_string()).unwrap());
        assert!(table.has(&txn, &"ALICE".to_string()).unwrap());
    }

    #[test]
    fn duplicate_table_keeps_both_ids() {
        let (_env, mut txn) = write_env();
        let table = string_table(true);
        table.create(&mut txn).unwrap();

        let a = EntryId::from_bytes([1; 16]);
        let b = EntryId::from_bytes([2; 16]);
        table.put(&mut txn, &"x".to_string(), &a).unwrap();
        table.put(&mut txn, &"x".to_string(), &b).unwrap();

        assert_eq!(table.count_key(&txn, &"x".to_string()).unwrap(), 2);
        assert!(table.has_pair(&txn, &"x".to_string(), &a).unwrap());
        // get returns the first value in value order
        assert_eq!(table.get(&txn, &"x".to_string()).unwrap(), Some(a));
    }

    #[test]
    fn pair_ops_rejected_on_non_duplicate_table() {
        let (_env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();

        let id = EntryId::new();
        let err = table
            .has_greater_or_equal_pair(&txn, &"x".to_string(), &id)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::UnsupportedOperation { .. }));
    }

    #[test]
    fn greater_or_equal_pair_scoped_to_key() {
        let (_env, mut txn) = write_env();
        let table = string_table(true);
        table.create(&mut txn).unwrap();

        let low = EntryId::from_bytes([1; 16]);
        let high = EntryId::from_bytes([9; 16]);
        let mid = EntryId::from_bytes([5; 16]);
        table.put(&mut txn, &"x".to_string(), &low).unwrap();
        table.put(&mut txn, &"x".to_string(), &high).unwrap();

        assert!(table
            .has_greater_or_equal_pair(&txn, &"x".to_string(), &mid)
            .unwrap());
        assert!(table
            .has_less_or_equal_pair(&txn, &"x".to_string(), &mid)
            .unwrap());
        assert!(!table
            .has_greater_or_equal_pair(&txn, &"y".to_string(), &mid)
            .unwrap());
    }

    #[test]
    fn range_counts_are_capped() {
        let (_env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();

        for i in 0..50u32 {
            table
                .put(&mut txn, &format!("k{i:03}"), &EntryId::new())
                .unwrap();
        }

        assert_eq!(
            table
                .greater_than_count(&txn, &"k000".to_string())
                .unwrap(),
            RANGE_COUNT_CAP
        );
        assert_eq!(
            table.less_than_count(&txn, &"k049".to_string()).unwrap(),
            RANGE_COUNT_CAP
        );
        assert_eq!(
            table.less_than_count(&txn, &"k003".to_string()).unwrap(),
            3
        );
    }

    #[test]
    fn has_greater_and_less_or_equal() {
        let (_env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();

        table.put(&mut txn, &"m".to_string(), &EntryId::new()).unwrap();

        assert!(table.has_greater_or_equal(&txn, &"a".to_string()).unwrap());
        assert!(table.has_greater_or_equal(&txn, &"m".to_string()).unwrap());
        assert!(!table.has_greater_or_equal(&txn, &"z".to_string()).unwrap());
        assert!(table.has_less_or_equal(&txn, &"z".to_string()).unwrap());
        assert!(!table.has_less_or_equal(&txn, &"a".to_string()).unwrap());
    }

    #[test]
    fn cursor_requires_active_transaction() {
        let (_env, mut txn) = write_env();
        let table = string_table(false);
        table.create(&mut txn).unwrap();
        txn.commit().unwrap();

        let err = table.cursor(&txn).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidOperation { .. }));
    }

    #[test]
    fn csn_datum_roundtrip() {
        let csn = Csn::new(42, 1, 2);
        let bytes = csn.encode().unwrap();
        assert_eq!(Csn::decode(&bytes).unwrap(), csn);
    }

    proptest! {
        #[test]
        fn duplicate_insert_idempotent(values in prop::collection::vec(any::<[u8; 16]>(), 1..20)) {
            let (_env, mut txn) = write_env();
            let table = string_table(true);
            table.create(&mut txn).unwrap();

            for v in &values {
                let id = EntryId::from_bytes(*v);
                table.put(&mut txn, &"k".to_string(), &id).unwrap();
                table.put(&mut txn, &"k".to_string(), &id).unwrap();
            }

            let distinct: std::collections::HashSet<_> = values.iter().collect();
            prop_assert_eq!(
                table.count_key(&txn, &"k".to_string()).unwrap(),
                distinct.len()
            );
        }
    }
}
