//! The master table: the authoritative id-to-entry store.

use crate::entry::Entry;
use crate::error::DirResult;
use crate::table::{NaturalComparator, Table, TableCursor};
use crate::txn::WriteTransaction;
use crate::types::EntryId;
use ditstore_storage::TreeView;
use std::sync::Arc;

/// Maps entry ids to serialized entries.
///
/// Every other table in a partition is an index over this one and can be
/// rebuilt from it.
pub struct MasterTable {
    table: Table<EntryId, Entry>,
}

impl MasterTable {
    /// Name of the backing tree.
    pub const TREE_NAME: &'static str = "master";

    /// Creates the master table handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Table::new(Self::TREE_NAME, Arc::new(NaturalComparator), None, false),
        }
    }

    /// Creates the backing tree if it does not already exist.
    pub fn create(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        self.table.create(txn)
    }

    /// Allocates a fresh entry id.
    ///
    /// Ids are random, so allocation needs no transaction and never
    /// conflicts with concurrent writers.
    #[must_use]
    pub fn next_id(&self) -> EntryId {
        EntryId::new()
    }

    /// Returns the entry stored under `id`.
    pub fn get(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Option<Entry>> {
        self.table.get(txn, &id)
    }

    /// Returns whether an entry is stored under `id`.
    pub fn has(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<bool> {
        self.table.has(txn, &id)
    }

    /// Stores an entry under `id`, replacing any previous version.
    pub fn put(&self, txn: &mut WriteTransaction, id: EntryId, entry: &Entry) -> DirResult<()> {
        self.table.put(txn, &id, entry)
    }

    /// Removes the entry stored under `id`. Returns `true` if present.
    pub fn remove(&self, txn: &mut WriteTransaction, id: EntryId) -> DirResult<bool> {
        self.table.remove(txn, &id)
    }

    /// Returns the number of stored entries.
    pub fn count(&self, txn: &dyn TreeView) -> DirResult<usize> {
        self.table.count(txn)
    }

    /// Opens a cursor over every (id, entry) pair.
    pub fn cursor(&self, txn: &dyn TreeView) -> DirResult<TableCursor<EntryId, Entry>> {
        self.table.cursor(txn)
    }
}

impl Default for MasterTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Dn;
    use crate::txn::tests::write_env;

    #[test]
    fn put_get_remove() {
        let (_env, mut txn) = write_env();
        let master = MasterTable::new();
        master.create(&mut txn).unwrap();

        let id = master.next_id();
        let entry = Entry::new(Dn::parse("cn=a,dc=x").unwrap());
        master.put(&mut txn, id, &entry).unwrap();

        assert!(master.has(&txn, id).unwrap());
        assert_eq!(master.get(&txn, id).unwrap().unwrap().dn(), entry.dn());
        assert_eq!(master.count(&txn).unwrap(), 1);

        assert!(master.remove(&mut txn, id).unwrap());
        assert!(!master.has(&txn, id).unwrap());
    }

    #[test]
    fn cursor_scans_all_entries() {
        let (_env, mut txn) = write_env();
        let master = MasterTable::new();
        master.create(&mut txn).unwrap();

        for i in 0..3 {
            let entry = Entry::new(Dn::parse(&format!("cn=e{i},dc=x")).unwrap());
            master.put(&mut txn, master.next_id(), &entry).unwrap();
        }

        let mut cursor = master.cursor(&txn).unwrap();
        let mut seen = 0;
        while cursor.next() {
            cursor.get().unwrap();
            seen += 1;
        }
        assert_eq!(seen, 3);
    }
}
