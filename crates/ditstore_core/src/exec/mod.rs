//! Operation execution: add, delete, and modify as index mutation plans.
//!
//! The execution manager turns one directory operation into an ordered
//! sequence of index mutations plus a master-table write, all staged in
//! the caller's write transaction. No index is ever updated without its
//! counterparts in the same transaction, so a commit publishes either the
//! whole operation or nothing.

mod alias;
mod changes;

pub use changes::{ChangeSet, EntryChange, IndexChange, IndexOp};

use crate::entry::{oids, Attribute, Entry, Value};
use crate::error::{DirResult, DirectoryError};
use crate::index::rdn::ParentIdAndRdn;
use crate::index::Index;
use crate::name::Dn;
use crate::partition::PartitionStore;
use crate::table::Datum;
use crate::txn::WriteTransaction;
use crate::types::{Csn, EntryId};
use std::sync::Arc;

/// Kind of a single attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    /// Add values to an attribute, creating it if absent.
    Add,
    /// Remove specific values, or the whole attribute if none are given.
    Remove,
    /// Replace the attribute's values wholesale.
    Replace,
}

/// One attribute modification within a modify operation.
#[derive(Debug, Clone)]
pub struct Modification {
    op: ModOp,
    attribute: Attribute,
}

impl Modification {
    /// An ADD modification.
    #[must_use]
    pub fn add(attribute: Attribute) -> Self {
        Self {
            op: ModOp::Add,
            attribute,
        }
    }

    /// A REMOVE modification. An attribute with no values means "remove
    /// the attribute entirely".
    #[must_use]
    pub fn remove(attribute: Attribute) -> Self {
        Self {
            op: ModOp::Remove,
            attribute,
        }
    }

    /// A REPLACE modification. An attribute with no values removes it.
    #[must_use]
    pub fn replace(attribute: Attribute) -> Self {
        Self {
            op: ModOp::Replace,
            attribute,
        }
    }

    /// Returns the modification kind.
    #[must_use]
    pub fn op(&self) -> ModOp {
        self.op
    }

    /// Returns the attribute carrying the values to apply.
    #[must_use]
    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }
}

/// Applies an index add and records it in the change set.
pub(crate) fn record_add<K: Datum + Clone + 'static>(
    txn: &mut WriteTransaction,
    index: &Index<K>,
    key: &K,
    id: EntryId,
    changes: &mut ChangeSet,
) -> DirResult<()> {
    index.add(txn, key, id)?;
    changes.record(index.oid(), key.encode()?, id, IndexOp::Add);
    Ok(())
}

/// Applies an index drop and records it in the change set.
pub(crate) fn record_drop<K: Datum + Clone + 'static>(
    txn: &mut WriteTransaction,
    index: &Index<K>,
    key: &K,
    id: EntryId,
    changes: &mut ChangeSet,
) -> DirResult<()> {
    index.drop_pair(txn, key, id)?;
    changes.record(index.oid(), key.encode()?, id, IndexOp::Delete);
    Ok(())
}

fn object_class_key(value: &Value) -> DirResult<String> {
    Ok(value
        .as_str()
        .ok_or_else(|| DirectoryError::schema_violation("objectClass value is not text"))?
        .trim()
        .to_ascii_lowercase())
}

fn csn_of(attribute: &Attribute) -> DirResult<Csn> {
    attribute
        .first()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DirectoryError::schema_violation("missing or malformed entryCSN value"))
}

/// Executes add, delete, and modify against a partition's tables.
pub struct ExecutionManager {
    store: Arc<PartitionStore>,
}

impl ExecutionManager {
    pub(crate) fn new(store: Arc<PartitionStore>) -> Self {
        Self { store }
    }

    /// Adds an entry, staging every index pairing and the master-table row.
    pub fn add(&self, txn: &mut WriteTransaction, mut entry: Entry) -> DirResult<ChangeSet> {
        let store = &*self.store;
        let dn = entry.dn().clone();
        if store.entry_id(txn, &dn)?.is_some() {
            return Err(DirectoryError::entry_already_exists(dn.to_string()));
        }

        let (parent_id, rdn_key) = if dn == store.suffix {
            (
                EntryId::ROOT,
                ParentIdAndRdn::new(EntryId::ROOT, store.suffix.rdns().to_vec()),
            )
        } else {
            if !store.suffix.is_ancestor_of(&dn) {
                return Err(DirectoryError::no_such_object(format!(
                    "{dn} is outside the partition suffix {}",
                    store.suffix
                )));
            }
            // size > suffix size, so a parent always exists
            let parent_dn = dn
                .parent()
                .ok_or_else(|| DirectoryError::no_such_object(dn.to_string()))?;
            let parent_id = store
                .entry_id(txn, &parent_dn)?
                .ok_or_else(|| DirectoryError::no_such_object(parent_dn.to_string()))?;
            (parent_id, ParentIdAndRdn::single(parent_id, dn.rdn().clone()))
        };

        let id = store.master.next_id();
        let mut changes = ChangeSet::new(id);
        let ancestors = store.ancestor_ids(txn, parent_id)?;

        self.stage_entry_indices(txn, &mut changes, id, parent_id, &rdn_key, &ancestors, &entry)?;

        if entry.is_alias() {
            let target = entry.alias_target()?.ok_or_else(|| {
                DirectoryError::schema_violation("alias entry has no aliasedObjectName value")
            })?;
            alias::add_alias_indices(store, txn, &mut changes, id, &dn, &target)?;
        }

        entry.put_attribute(Attribute::with_values(
            oids::ENTRY_PARENT_ID,
            vec![parent_id.to_string()],
        ));
        store.master.put(txn, id, &entry)?;
        changes.set_entry_change(EntryChange::Add(entry));

        tracing::debug!(id = %id, dn = %dn, "added entry");
        Ok(changes)
    }

    /// Deletes a leaf entry, tearing down every index pairing that add
    /// staged for it.
    pub fn delete(&self, txn: &mut WriteTransaction, dn: &Dn) -> DirResult<ChangeSet> {
        let store = &*self.store;
        let id = store
            .entry_id(txn, dn)?
            .ok_or_else(|| DirectoryError::no_such_object(dn.to_string()))?;
        if store.one_level_idx.forward_has(txn, &id)? {
            return Err(DirectoryError::not_empty(dn.to_string()));
        }
        let entry = store
            .master
            .get(txn, id)?
            .ok_or_else(|| DirectoryError::no_such_object(dn.to_string()))?;
        let mut changes = ChangeSet::new(id);

        if entry.is_alias() {
            alias::drop_alias_indices(store, txn, &mut changes, id)?;
        }

        if let Some(oc) = entry.get(oids::OBJECT_CLASS) {
            for value in oc.values() {
                let key = object_class_key(value)?;
                record_drop(txn, &store.object_class_idx, &key, id, &mut changes)?;
            }
        }

        let rdn_key = store.rdn_idx.reverse_lookup(txn, id)?.ok_or_else(|| {
            DirectoryError::invalid_operation(format!("hierarchy index has no key for entry {id}"))
        })?;
        let parent_id = rdn_key.parent_id();
        record_drop(txn, &store.rdn_idx, &rdn_key, id, &mut changes)?;
        record_drop(txn, &store.one_level_idx, &parent_id, id, &mut changes)?;

        // reverse scan finds every ancestor pairing, self pairing included
        for ancestor in store.sub_level_idx.reverse_values(txn, id)? {
            record_drop(txn, &store.sub_level_idx, &ancestor, id, &mut changes)?;
        }

        if let Some(csn) = entry.csn() {
            record_drop(txn, &store.entry_csn_idx, &csn, id, &mut changes)?;
        }
        if let Some(uuid) = entry.uuid() {
            let uuid = uuid.to_string();
            record_drop(txn, &store.entry_uuid_idx, &uuid, id, &mut changes)?;
        }

        for attribute in entry.attributes() {
            if is_operational(attribute.oid()) {
                continue;
            }
            if let Some(index) = store.user_index(attribute.oid()) {
                for value in attribute.values() {
                    let key = store.schema.normalize_value(attribute.oid(), value);
                    record_drop(txn, &index, &key, id, &mut changes)?;
                }
                let oid = attribute.oid().to_string();
                record_drop(txn, &store.presence_idx, &oid, id, &mut changes)?;
            }
        }

        store.master.remove(txn, id)?;
        changes.set_entry_change(EntryChange::Delete(entry));

        tracing::debug!(id = %id, dn = %dn, "deleted entry");
        Ok(changes)
    }

    /// Applies a sequence of attribute modifications to an entry.
    pub fn modify(
        &self,
        txn: &mut WriteTransaction,
        dn: &Dn,
        mods: &[Modification],
    ) -> DirResult<ChangeSet> {
        let store = &*self.store;
        let id = store
            .entry_id(txn, dn)?
            .ok_or_else(|| DirectoryError::no_such_object(dn.to_string()))?;
        let before = store
            .master
            .get(txn, id)?
            .ok_or_else(|| DirectoryError::no_such_object(dn.to_string()))?;
        // modify must work on the stored entry, never a lookup snapshot
        debug_assert!(!before.is_detached());

        let mut entry = before.clone();
        let mut changes = ChangeSet::new(id);

        for modification in mods {
            match modification.op() {
                ModOp::Add => {
                    self.apply_add(txn, &mut changes, id, &mut entry, modification.attribute())?;
                }
                ModOp::Remove => {
                    self.apply_remove(txn, &mut changes, id, &mut entry, modification.attribute())?;
                }
                ModOp::Replace => {
                    self.apply_replace(
                        txn,
                        &mut changes,
                        id,
                        &mut entry,
                        modification.attribute(),
                    )?;
                }
            }
        }

        store.master.put(txn, id, &entry)?;
        changes.set_entry_change(EntryChange::Modify {
            before,
            after: entry,
        });

        tracing::debug!(id = %id, dn = %dn, mods = mods.len(), "modified entry");
        Ok(changes)
    }

    /// Stages every non-alias index pairing for an entry being added.
    ///
    /// Shared between add and the index rebuild scan.
    pub(crate) fn stage_entry_indices(
        &self,
        txn: &mut WriteTransaction,
        changes: &mut ChangeSet,
        id: EntryId,
        parent_id: EntryId,
        rdn_key: &ParentIdAndRdn,
        ancestors: &[EntryId],
        entry: &Entry,
    ) -> DirResult<()> {
        let store = &*self.store;

        record_add(txn, &store.rdn_idx, rdn_key, id, changes)?;

        let oc = entry.get(oids::OBJECT_CLASS).ok_or_else(|| {
            DirectoryError::schema_violation("entry has no objectClass attribute")
        })?;
        for value in oc.values() {
            let key = object_class_key(value)?;
            record_add(txn, &store.object_class_idx, &key, id, changes)?;
        }

        record_add(txn, &store.one_level_idx, &parent_id, id, changes)?;
        for ancestor in ancestors {
            record_add(txn, &store.sub_level_idx, ancestor, id, changes)?;
        }
        // an entry is always within its own subtree
        record_add(txn, &store.sub_level_idx, &id, id, changes)?;

        let csn = entry
            .csn()
            .ok_or_else(|| DirectoryError::schema_violation("missing or malformed entryCSN"))?;
        record_add(txn, &store.entry_csn_idx, &csn, id, changes)?;

        let uuid = entry
            .uuid()
            .ok_or_else(|| DirectoryError::schema_violation("missing entryUUID"))?
            .to_string();
        record_add(txn, &store.entry_uuid_idx, &uuid, id, changes)?;

        for attribute in entry.attributes() {
            if is_operational(attribute.oid()) {
                continue;
            }
            if let Some(index) = store.user_index(attribute.oid()) {
                let oid = attribute.oid().to_string();
                record_add(txn, &store.presence_idx, &oid, id, changes)?;
                for value in attribute.values() {
                    let key = store.schema.normalize_value(attribute.oid(), value);
                    record_add(txn, &index, &key, id, changes)?;
                }
            }
        }
        Ok(())
    }

    /// Re-stages the alias indices for one alias entry, used by rebuild.
    pub(crate) fn stage_alias_indices(
        &self,
        txn: &mut WriteTransaction,
        changes: &mut ChangeSet,
        id: EntryId,
        entry: &Entry,
    ) -> DirResult<()> {
        let target = entry.alias_target()?.ok_or_else(|| {
            DirectoryError::schema_violation("alias entry has no aliasedObjectName value")
        })?;
        alias::add_alias_indices(&self.store, txn, changes, id, entry.dn(), &target)
    }

    fn apply_add(
        &self,
        txn: &mut WriteTransaction,
        changes: &mut ChangeSet,
        id: EntryId,
        entry: &mut Entry,
        attribute: &Attribute,
    ) -> DirResult<()> {
        let store = &*self.store;
        let oid = attribute.oid();

        if oid == oids::ALIASED_OBJECT_NAME {
            for value in attribute.values() {
                entry.add_value(oid, value.clone());
            }
            let target = entry.alias_target()?.ok_or_else(|| {
                DirectoryError::schema_violation("aliasedObjectName add carries no value")
            })?;
            return alias::add_alias_indices(store, txn, changes, id, entry.dn(), &target);
        }

        if oid == oids::OBJECT_CLASS {
            for value in attribute.values() {
                let key = object_class_key(value)?;
                record_add(txn, &store.object_class_idx, &key, id, changes)?;
                entry.add_value(oid, value.clone());
            }
            return Ok(());
        }

        if oid == oids::ENTRY_CSN {
            // single valued: an add behaves as a replace
            if let Some(old) = entry.csn() {
                record_drop(txn, &store.entry_csn_idx, &old, id, changes)?;
            }
            let new = csn_of(attribute)?;
            record_add(txn, &store.entry_csn_idx, &new, id, changes)?;
            entry.put_attribute(attribute.clone());
            return Ok(());
        }

        let was_present = entry.get(oid).is_some();
        for value in attribute.values() {
            entry.add_value(oid, value.clone());
        }
        if let Some(index) = store.user_index(oid) {
            for value in attribute.values() {
                let key = store.schema.normalize_value(oid, value);
                record_add(txn, &index, &key, id, changes)?;
            }
            if !was_present {
                let oid = oid.to_string();
                record_add(txn, &store.presence_idx, &oid, id, changes)?;
            }
        }
        Ok(())
    }

    fn apply_remove(
        &self,
        txn: &mut WriteTransaction,
        changes: &mut ChangeSet,
        id: EntryId,
        entry: &mut Entry,
        attribute: &Attribute,
    ) -> DirResult<()> {
        let store = &*self.store;
        let oid = attribute.oid();

        if oid == oids::ALIASED_OBJECT_NAME {
            alias::drop_alias_indices(store, txn, changes, id)?;
            if attribute.is_empty() {
                entry.remove_attribute(oid);
            } else {
                for value in attribute.values() {
                    entry.remove_value(oid, value);
                }
            }
            return Ok(());
        }

        if oid == oids::OBJECT_CLASS {
            if attribute.is_empty() {
                if let Some(existing) = entry.remove_attribute(oid) {
                    for value in existing.values() {
                        let key = object_class_key(value)?;
                        record_drop(txn, &store.object_class_idx, &key, id, changes)?;
                    }
                }
            } else {
                for value in attribute.values() {
                    let key = object_class_key(value)?;
                    record_drop(txn, &store.object_class_idx, &key, id, changes)?;
                    entry.remove_value(oid, value);
                }
            }
            return Ok(());
        }

        if oid == oids::ENTRY_CSN {
            if let Some(old) = entry.csn() {
                record_drop(txn, &store.entry_csn_idx, &old, id, changes)?;
            }
            entry.remove_attribute(oid);
            return Ok(());
        }

        if let Some(index) = store.user_index(oid) {
            if attribute.is_empty() {
                for key in index.reverse_values(txn, id)? {
                    record_drop(txn, &index, &key, id, changes)?;
                }
                let oid_key = oid.to_string();
                record_drop(txn, &store.presence_idx, &oid_key, id, changes)?;
            } else {
                for value in attribute.values() {
                    let key = store.schema.normalize_value(oid, value);
                    record_drop(txn, &index, &key, id, changes)?;
                }
                if !index.reverse_has(txn, id)? {
                    let oid_key = oid.to_string();
                    record_drop(txn, &store.presence_idx, &oid_key, id, changes)?;
                }
            }
        }
        if attribute.is_empty() {
            entry.remove_attribute(oid);
        } else {
            for value in attribute.values() {
                entry.remove_value(oid, value);
            }
        }
        Ok(())
    }

    fn apply_replace(
        &self,
        txn: &mut WriteTransaction,
        changes: &mut ChangeSet,
        id: EntryId,
        entry: &mut Entry,
        attribute: &Attribute,
    ) -> DirResult<()> {
        let store = &*self.store;
        let oid = attribute.oid();

        if oid == oids::ALIASED_OBJECT_NAME {
            alias::drop_alias_indices(store, txn, changes, id)?;
            entry.remove_attribute(oid);
            if !attribute.is_empty() {
                entry.put_attribute(attribute.clone());
                let target = entry.alias_target()?.ok_or_else(|| {
                    DirectoryError::schema_violation("aliasedObjectName replace carries no value")
                })?;
                alias::add_alias_indices(store, txn, changes, id, entry.dn(), &target)?;
            }
            return Ok(());
        }

        if oid == oids::OBJECT_CLASS {
            for key in store.object_class_idx.reverse_values(txn, id)? {
                record_drop(txn, &store.object_class_idx, &key, id, changes)?;
            }
            entry.remove_attribute(oid);
            if !attribute.is_empty() {
                for value in attribute.values() {
                    let key = object_class_key(value)?;
                    record_add(txn, &store.object_class_idx, &key, id, changes)?;
                }
                entry.put_attribute(attribute.clone());
            }
            return Ok(());
        }

        if oid == oids::ENTRY_CSN {
            // single valued: no cursoring needed, one drop and one add
            if let Some(old) = entry.csn() {
                record_drop(txn, &store.entry_csn_idx, &old, id, changes)?;
            }
            entry.remove_attribute(oid);
            if !attribute.is_empty() {
                let new = csn_of(attribute)?;
                record_add(txn, &store.entry_csn_idx, &new, id, changes)?;
                entry.put_attribute(attribute.clone());
            }
            return Ok(());
        }

        let was_present = entry.get(oid).is_some();
        if let Some(index) = store.user_index(oid) {
            for key in index.reverse_values(txn, id)? {
                record_drop(txn, &index, &key, id, changes)?;
            }
            if attribute.is_empty() {
                if was_present {
                    let oid_key = oid.to_string();
                    record_drop(txn, &store.presence_idx, &oid_key, id, changes)?;
                }
            } else {
                for value in attribute.values() {
                    let key = store.schema.normalize_value(oid, value);
                    record_add(txn, &index, &key, id, changes)?;
                }
                if !was_present {
                    let oid_key = oid.to_string();
                    record_add(txn, &store.presence_idx, &oid_key, id, changes)?;
                }
            }
        }
        entry.remove_attribute(oid);
        if !attribute.is_empty() {
            entry.put_attribute(attribute.clone());
        }
        Ok(())
    }
}

fn is_operational(oid: &str) -> bool {
    matches!(
        oid,
        oids::OBJECT_CLASS
            | oids::ENTRY_CSN
            | oids::ENTRY_UUID
            | oids::ENTRY_PARENT_ID
            | oids::ALIASED_OBJECT_NAME
    )
}
