//! Records of what an operation changed.
//!
//! Every executed operation produces a [`ChangeSet`] describing the entry
//! mutation and each index pairing it staged, in order. Callers use it for
//! change logging and replication feeds.

use crate::entry::Entry;
use crate::types::EntryId;

/// Direction of an index mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    /// The pairing was added.
    Add,
    /// The pairing was removed.
    Delete,
}

/// One index pairing added or removed by an operation.
#[derive(Debug, Clone)]
pub struct IndexChange {
    index_oid: String,
    key: Vec<u8>,
    entry_id: EntryId,
    op: IndexOp,
}

impl IndexChange {
    /// Returns the identifier of the affected index.
    #[must_use]
    pub fn index_oid(&self) -> &str {
        &self.index_oid
    }

    /// Returns the encoded index key.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the entry id side of the pairing.
    #[must_use]
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Returns the direction of the mutation.
    #[must_use]
    pub fn op(&self) -> IndexOp {
        self.op
    }
}

/// The entry-level effect of an operation.
#[derive(Debug, Clone)]
pub enum EntryChange {
    /// A new entry was stored.
    Add(Entry),
    /// An entry was removed; the removed state is carried.
    Delete(Entry),
    /// An entry was rewritten.
    Modify {
        /// The entry as stored before the operation.
        before: Entry,
        /// The entry as stored after the operation.
        after: Entry,
    },
}

/// Everything one operation changed, in staging order.
#[derive(Debug)]
pub struct ChangeSet {
    entry_id: EntryId,
    index_changes: Vec<IndexChange>,
    entry_change: Option<EntryChange>,
}

impl ChangeSet {
    pub(crate) fn new(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            index_changes: Vec::new(),
            entry_change: None,
        }
    }

    pub(crate) fn record(&mut self, index_oid: &str, key: Vec<u8>, entry_id: EntryId, op: IndexOp) {
        self.index_changes.push(IndexChange {
            index_oid: index_oid.to_string(),
            key,
            entry_id,
            op,
        });
    }

    pub(crate) fn set_entry_change(&mut self, change: EntryChange) {
        self.entry_change = Some(change);
    }

    /// Returns the id of the entry the operation targeted.
    #[must_use]
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Returns the index mutations in the order they were staged.
    #[must_use]
    pub fn index_changes(&self) -> &[IndexChange] {
        &self.index_changes
    }

    /// Returns the entry-level effect.
    #[must_use]
    pub fn entry_change(&self) -> Option<&EntryChange> {
        self.entry_change.as_ref()
    }
}
