//! Attribute indices: paired forward and reverse tables.
//!
//! The forward table maps an attribute key to the ids of the entries
//! holding it; the reverse table maps an entry id back to the keys it is
//! indexed under, which lets teardown find every forward pair to remove
//! without scanning. Both tables are always updated inside the same write
//! transaction, so they cannot drift apart.

pub mod rdn;

use crate::error::{DirResult, DirectoryError};
use crate::table::{Comparator, Datum, KeyCursor, NaturalComparator, Table, TableCursor, ValueCursor};
use crate::txn::WriteTransaction;
use crate::types::EntryId;
use ditstore_storage::TreeView;
use std::sync::Arc;

/// A forward/reverse index pair over one attribute.
///
/// Three shapes exist:
/// - duplicate forward + reverse (the common case),
/// - unique forward + unique reverse (one key per entry, one entry per
///   key, e.g. the Rdn index),
/// - forward only (presence, where the reverse would mirror the forward).
pub struct Index<K> {
    oid: String,
    forward: Table<K, EntryId>,
    reverse: Option<Table<EntryId, K>>,
}

impl<K: Datum + Clone + 'static> Index<K> {
    /// Creates a standard index: duplicate-enabled forward table plus a
    /// reverse table. `reverse_multi_valued` says whether one entry can be
    /// indexed under several keys.
    #[must_use]
    pub fn new(
        oid: impl Into<String>,
        key_cmp: Arc<dyn Comparator<K>>,
        reverse_multi_valued: bool,
    ) -> Self {
        let oid = oid.into();
        Self {
            forward: Table::new(
                format!("{oid}_forward"),
                Arc::clone(&key_cmp),
                None,
                true,
            ),
            reverse: Some(Table::new(
                format!("{oid}_reverse"),
                Arc::new(NaturalComparator),
                Some(key_cmp),
                reverse_multi_valued,
            )),
            oid,
        }
    }

    /// Creates a unique index: at most one entry per key and one key per
    /// entry.
    #[must_use]
    pub fn unique(oid: impl Into<String>, key_cmp: Arc<dyn Comparator<K>>) -> Self {
        let oid = oid.into();
        Self {
            forward: Table::new(
                format!("{oid}_forward"),
                Arc::clone(&key_cmp),
                None,
                false,
            ),
            reverse: Some(Table::new(
                format!("{oid}_reverse"),
                Arc::new(NaturalComparator),
                Some(key_cmp),
                false,
            )),
            oid,
        }
    }

    /// Creates a forward-only index with no reverse table.
    #[must_use]
    pub fn forward_only(oid: impl Into<String>, key_cmp: Arc<dyn Comparator<K>>) -> Self {
        let oid = oid.into();
        Self {
            forward: Table::new(format!("{oid}_forward"), key_cmp, None, true),
            reverse: None,
            oid,
        }
    }

    /// Returns the attribute identifier this index covers.
    #[must_use]
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Returns whether the index maintains a reverse table.
    #[must_use]
    pub fn has_reverse(&self) -> bool {
        self.reverse.is_some()
    }

    /// Returns whether one entry may be indexed under several keys.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        self.reverse
            .as_ref()
            .map_or(true, Table::allows_duplicates)
    }

    /// Creates the backing trees if they do not already exist.
    pub fn create(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        self.forward.create(txn)?;
        if let Some(reverse) = &self.reverse {
            reverse.create(txn)?;
        }
        Ok(())
    }

    /// Indexes `id` under `key` in both directions.
    pub fn add(&self, txn: &mut WriteTransaction, key: &K, id: EntryId) -> DirResult<()> {
        self.forward.put(txn, key, &id)?;
        if let Some(reverse) = &self.reverse {
            reverse.put(txn, &id, key)?;
        }
        Ok(())
    }

    /// Removes the (key, id) pairing from both directions.
    ///
    /// A pairing that is not present is silently ignored.
    pub fn drop_pair(&self, txn: &mut WriteTransaction, key: &K, id: EntryId) -> DirResult<()> {
        self.forward.remove_pair(txn, key, &id)?;
        if let Some(reverse) = &self.reverse {
            reverse.remove_pair(txn, &id, key)?;
        }
        Ok(())
    }

    /// Removes every pairing of `id` using the reverse table to find them.
    ///
    /// Errors on a forward-only index, which has no way to locate the
    /// forward pairs.
    pub fn drop_all(&self, txn: &mut WriteTransaction, id: EntryId) -> DirResult<()> {
        let Some(reverse) = &self.reverse else {
            return Err(DirectoryError::unsupported(format!(
                "drop_all requires a reverse table: {}",
                self.oid
            )));
        };
        if reverse.allows_duplicates() {
            let mut cursor = reverse.value_cursor(txn, &id)?;
            let mut keys = Vec::with_capacity(cursor.len());
            while cursor.next() {
                keys.push(cursor.get()?);
            }
            for key in keys {
                self.forward.remove_pair(txn, &key, &id)?;
            }
        } else if let Some(key) = reverse.get(txn, &id)? {
            self.forward.remove_pair(txn, &key, &id)?;
        }
        reverse.remove(txn, &id)?;
        Ok(())
    }

    /// Returns the first entry id indexed under `key`.
    pub fn forward_lookup(&self, txn: &dyn TreeView, key: &K) -> DirResult<Option<EntryId>> {
        self.forward.get(txn, key)
    }

    /// Returns whether any entry is indexed under `key`.
    pub fn forward_has(&self, txn: &dyn TreeView, key: &K) -> DirResult<bool> {
        self.forward.has(txn, key)
    }

    /// Returns whether `id` is indexed under `key`.
    pub fn forward_has_pair(&self, txn: &dyn TreeView, key: &K, id: EntryId) -> DirResult<bool> {
        self.forward.has_pair(txn, key, &id)
    }

    /// Returns one key `id` is indexed under, if any.
    pub fn reverse_lookup(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Option<K>> {
        match &self.reverse {
            Some(reverse) => reverse.get(txn, &id),
            None => Ok(None),
        }
    }

    /// Returns whether `id` is indexed under any key.
    pub fn reverse_has(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<bool> {
        match &self.reverse {
            Some(reverse) => reverse.has(txn, &id),
            None => Ok(false),
        }
    }

    /// Returns every key `id` is indexed under.
    pub fn reverse_values(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Vec<K>> {
        let Some(reverse) = &self.reverse else {
            return Ok(Vec::new());
        };
        let mut cursor = reverse.value_cursor(txn, &id)?;
        let mut keys = Vec::with_capacity(cursor.len());
        while cursor.next() {
            keys.push(cursor.get()?);
        }
        Ok(keys)
    }

    /// Opens a cursor over every (key, id) pair in key order.
    pub fn cursor(&self, txn: &dyn TreeView) -> DirResult<TableCursor<K, EntryId>> {
        self.forward.cursor(txn)
    }

    /// Opens a cursor over the ids indexed under one key.
    pub fn key_cursor(&self, txn: &dyn TreeView, key: &K) -> DirResult<KeyCursor<K, EntryId>> {
        self.forward.key_cursor(txn, key)
    }

    /// Opens a restartable cursor over the ids indexed under one key.
    pub fn value_cursor(&self, txn: &dyn TreeView, key: &K) -> DirResult<ValueCursor<EntryId>> {
        self.forward.value_cursor(txn, key)
    }

    /// Returns the total number of (key, id) pairs.
    pub fn count(&self, txn: &dyn TreeView) -> DirResult<usize> {
        self.forward.count(txn)
    }

    /// Returns the number of ids indexed under `key`.
    pub fn count_key(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        self.forward.count_key(txn, key)
    }

    /// Capped count of pairs under keys greater than `key`.
    pub fn greater_than_count(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        self.forward.greater_than_count(txn, key)
    }

    /// Capped count of pairs under keys less than `key`.
    pub fn less_than_count(&self, txn: &dyn TreeView, key: &K) -> DirResult<usize> {
        self.forward.less_than_count(txn, key)
    }

    /// Deletes the backing trees.
    pub fn destroy(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        txn.delete_tree(self.forward.name())?;
        if let Some(reverse) = &self.reverse {
            txn.delete_tree(reverse.name())?;
        }
        Ok(())
    }

    /// Empties both backing trees.
    pub fn clear(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        self.forward.clear(txn)?;
        if let Some(reverse) = &self.reverse {
            reverse.clear(txn)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CaseIgnoreComparator;
    use crate::txn::tests::write_env;
    use proptest::prelude::*;

    fn string_index() -> Index<String> {
        Index::new("2.5.4.3", Arc::new(CaseIgnoreComparator), true)
    }

    fn id(byte: u8) -> EntryId {
        EntryId::from_bytes([byte; 16])
    }

    #[test]
    fn add_updates_both_directions() {
        let (_env, mut txn) = write_env();
        let index = string_index();
        index.create(&mut txn).unwrap();

        index.add(&mut txn, &"alice".to_string(), id(1)).unwrap();

        assert_eq!(
            index.forward_lookup(&txn, &"alice".to_string()).unwrap(),
            Some(id(1))
        );
        assert_eq!(
            index.reverse_values(&txn, id(1)).unwrap(),
            vec!["alice".to_string()]
        );
    }

    #[test]
    fn drop_pair_is_tolerant_of_absence() {
        let (_env, mut txn) = write_env();
        let index = string_index();
        index.create(&mut txn).unwrap();

        index.drop_pair(&mut txn, &"ghost".to_string(), id(1)).unwrap();
        assert_eq!(index.count(&txn).unwrap(), 0);
    }

    #[test]
    fn drop_all_removes_every_key() {
        let (_env, mut txn) = write_env();
        let index = string_index();
        index.create(&mut txn).unwrap();

        index.add(&mut txn, &"a".to_string(), id(1)).unwrap();
        index.add(&mut txn, &"b".to_string(), id(1)).unwrap();
        index.add(&mut txn, &"a".to_string(), id(2)).unwrap();

        index.drop_all(&mut txn, id(1)).unwrap();

        assert!(!index.forward_has_pair(&txn, &"a".to_string(), id(1)).unwrap());
        assert!(!index.forward_has(&txn, &"b".to_string()).unwrap());
        assert!(index.forward_has_pair(&txn, &"a".to_string(), id(2)).unwrap());
        assert!(!index.reverse_has(&txn, id(1)).unwrap());
    }

    #[test]
    fn unique_index_overwrites() {
        let (_env, mut txn) = write_env();
        let index: Index<String> = Index::unique("x", Arc::new(CaseIgnoreComparator));
        index.create(&mut txn).unwrap();

        index.add(&mut txn, &"k".to_string(), id(1)).unwrap();
        index.add(&mut txn, &"k".to_string(), id(2)).unwrap();

        assert_eq!(
            index.forward_lookup(&txn, &"k".to_string()).unwrap(),
            Some(id(2))
        );
        assert_eq!(index.count_key(&txn, &"k".to_string()).unwrap(), 1);
    }

    #[test]
    fn forward_only_rejects_drop_all() {
        let (_env, mut txn) = write_env();
        let index: Index<String> = Index::forward_only("p", Arc::new(CaseIgnoreComparator));
        index.create(&mut txn).unwrap();
        index.add(&mut txn, &"cn".to_string(), id(1)).unwrap();

        assert!(matches!(
            index.drop_all(&mut txn, id(1)),
            Err(DirectoryError::UnsupportedOperation { .. })
        ));
        assert!(!index.reverse_has(&txn, id(1)).unwrap());
    }

    #[test]
    fn clear_empties_both_tables() {
        let (_env, mut txn) = write_env();
        let index = string_index();
        index.create(&mut txn).unwrap();
        index.add(&mut txn, &"a".to_string(), id(1)).unwrap();

        index.clear(&mut txn).unwrap();
        assert_eq!(index.count(&txn).unwrap(), 0);
        assert!(index.reverse_values(&txn, id(1)).unwrap().is_empty());
    }

    proptest! {
        // Whatever sequence of adds happens, reverse always mirrors forward.
        #[test]
        fn forward_and_reverse_stay_in_step(
            pairs in prop::collection::vec(("[a-d]{1,2}", 0u8..4), 0..30)
        ) {
            let (_env, mut txn) = write_env();
            let index = string_index();
            index.create(&mut txn).unwrap();

            for (key, byte) in &pairs {
                index.add(&mut txn, key, id(*byte)).unwrap();
            }

            for (key, byte) in &pairs {
                prop_assert!(index.forward_has_pair(&txn, key, id(*byte)).unwrap());
                prop_assert!(index
                    .reverse_values(&txn, id(*byte))
                    .unwrap()
                    .contains(key));
            }
        }
    }
}
