//! The partition: lifecycle, transaction routing, and operations.

use crate::config::PartitionConfig;
use crate::entry::{oids, Entry};
use crate::error::{DirResult, DirectoryError};
use crate::exec::{ChangeSet, ExecutionManager, Modification};
use crate::index::rdn::{ParentIdAndRdn, ParentIdAndRdnComparator};
use crate::index::Index;
use crate::master::MasterTable;
use crate::name::Dn;
use crate::schema::SchemaRegistry;
use crate::table::{CaseIgnoreComparator, NaturalComparator};
use crate::txn::{ReadTransaction, TransactionGauge, WriteTransaction};
use crate::types::{Csn, EntryId};
use ditstore_storage::{StorageEnv, TreeView};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The tables and indices of one partition, shared by the partition and
/// its execution manager.
pub struct PartitionStore {
    pub(crate) schema: SchemaRegistry,
    pub(crate) suffix: Dn,
    pub(crate) env: StorageEnv,
    pub(crate) master: MasterTable,
    pub(crate) rdn_idx: Index<ParentIdAndRdn>,
    pub(crate) object_class_idx: Index<String>,
    pub(crate) entry_csn_idx: Index<Csn>,
    pub(crate) entry_uuid_idx: Index<String>,
    pub(crate) presence_idx: Index<String>,
    pub(crate) one_level_idx: Index<EntryId>,
    pub(crate) sub_level_idx: Index<EntryId>,
    pub(crate) alias_idx: Index<Dn>,
    pub(crate) one_alias_idx: Index<EntryId>,
    pub(crate) sub_alias_idx: Index<EntryId>,
    pub(crate) user_indices: RwLock<HashMap<String, Arc<Index<Vec<u8>>>>>,
}

impl PartitionStore {
    fn new(schema: SchemaRegistry, suffix: Dn, env: StorageEnv) -> Self {
        Self {
            rdn_idx: Index::unique(oids::RDN_INDEX, Arc::new(ParentIdAndRdnComparator)),
            object_class_idx: Index::new(oids::OBJECT_CLASS, Arc::new(CaseIgnoreComparator), true),
            entry_csn_idx: Index::new(oids::ENTRY_CSN, Arc::new(NaturalComparator), false),
            entry_uuid_idx: Index::unique(oids::ENTRY_UUID, Arc::new(CaseIgnoreComparator)),
            presence_idx: Index::forward_only(oids::PRESENCE_INDEX, Arc::new(CaseIgnoreComparator)),
            one_level_idx: Index::new(oids::ONE_LEVEL_INDEX, Arc::new(NaturalComparator), false),
            sub_level_idx: Index::new(oids::SUB_LEVEL_INDEX, Arc::new(NaturalComparator), true),
            alias_idx: Index::new(oids::ALIAS_INDEX, Arc::new(NaturalComparator), false),
            one_alias_idx: Index::new(oids::ONE_ALIAS_INDEX, Arc::new(NaturalComparator), true),
            sub_alias_idx: Index::new(oids::SUB_ALIAS_INDEX, Arc::new(NaturalComparator), true),
            user_indices: RwLock::new(HashMap::new()),
            master: MasterTable::new(),
            schema,
            suffix,
            env,
        }
    }

    fn make_user_index(&self, oid: &str) -> Index<Vec<u8>> {
        Index::new(oid, self.schema.value_comparator(oid), true)
    }

    /// Resolves a Dn to an entry id by walking the hierarchy index from
    /// the suffix down.
    pub(crate) fn entry_id(&self, txn: &dyn TreeView, dn: &Dn) -> DirResult<Option<EntryId>> {
        if !self.suffix.is_ancestor_of_or_equal(dn) {
            return Ok(None);
        }
        let suffix_key = ParentIdAndRdn::new(EntryId::ROOT, self.suffix.rdns().to_vec());
        let Some(mut id) = self.rdn_idx.forward_lookup(txn, &suffix_key)? else {
            return Ok(None);
        };
        let below_suffix = dn.size() - self.suffix.size();
        for i in (0..below_suffix).rev() {
            let key = ParentIdAndRdn::single(id, dn.rdns()[i].clone());
            match self.rdn_idx.forward_lookup(txn, &key)? {
                Some(next) => id = next,
                None => return Ok(None),
            }
        }
        Ok(Some(id))
    }

    /// Returns the parent id of an entry via the hierarchy index.
    pub(crate) fn parent_id(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Option<EntryId>> {
        Ok(self
            .rdn_idx
            .reverse_lookup(txn, id)?
            .map(|key| key.parent_id()))
    }

    /// Collects the ancestor chain starting at `parent_id`, walking up to
    /// but excluding the synthetic root.
    pub(crate) fn ancestor_ids(
        &self,
        txn: &dyn TreeView,
        parent_id: EntryId,
    ) -> DirResult<Vec<EntryId>> {
        let mut ancestors = Vec::new();
        let mut current = parent_id;
        while !current.is_root() {
            ancestors.push(current);
            current = self.parent_id(txn, current)?.ok_or_else(|| {
                DirectoryError::invalid_operation(format!(
                    "hierarchy index has no parent for entry {current}"
                ))
            })?;
        }
        Ok(ancestors)
    }

    /// Reconstructs an entry's Dn from the hierarchy index.
    pub(crate) fn dn_of(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Dn> {
        let mut rdns = Vec::new();
        let mut current = id;
        loop {
            let key = self.rdn_idx.reverse_lookup(txn, current)?.ok_or_else(|| {
                DirectoryError::invalid_operation(format!(
                    "hierarchy index has no key for entry {current}"
                ))
            })?;
            rdns.extend_from_slice(key.rdns());
            if key.parent_id().is_root() {
                break;
            }
            current = key.parent_id();
        }
        Dn::from_rdns(rdns)
    }

    /// Returns the user index registered for an attribute, if any.
    pub(crate) fn user_index(&self, oid: &str) -> Option<Arc<Index<Vec<u8>>>> {
        self.user_indices.read().get(oid).cloned()
    }

    fn create_system_trees(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        self.master.create(txn)?;
        self.rdn_idx.create(txn)?;
        self.object_class_idx.create(txn)?;
        self.entry_csn_idx.create(txn)?;
        self.entry_uuid_idx.create(txn)?;
        self.presence_idx.create(txn)?;
        self.one_level_idx.create(txn)?;
        self.sub_level_idx.create(txn)?;
        self.alias_idx.create(txn)?;
        self.one_alias_idx.create(txn)?;
        self.sub_alias_idx.create(txn)?;
        Ok(())
    }

    fn clear_indices(&self, txn: &mut WriteTransaction) -> DirResult<()> {
        self.rdn_idx.clear(txn)?;
        self.object_class_idx.clear(txn)?;
        self.entry_csn_idx.clear(txn)?;
        self.entry_uuid_idx.clear(txn)?;
        self.presence_idx.clear(txn)?;
        self.one_level_idx.clear(txn)?;
        self.sub_level_idx.clear(txn)?;
        self.alias_idx.clear(txn)?;
        self.one_alias_idx.clear(txn)?;
        self.sub_alias_idx.clear(txn)?;
        for index in self.user_indices.read().values() {
            index.clear(txn)?;
        }
        Ok(())
    }

    fn known_index_oids(&self) -> Vec<String> {
        let mut known: Vec<String> = [
            oids::RDN_INDEX,
            oids::OBJECT_CLASS,
            oids::ENTRY_CSN,
            oids::ENTRY_UUID,
            oids::PRESENCE_INDEX,
            oids::ONE_LEVEL_INDEX,
            oids::SUB_LEVEL_INDEX,
            oids::ALIAS_INDEX,
            oids::ONE_ALIAS_INDEX,
            oids::SUB_ALIAS_INDEX,
        ]
        .iter()
        .map(|o| o.to_string())
        .collect();
        known.extend(self.user_indices.read().keys().cloned());
        known
    }
}

/// A directory partition rooted at one suffix Dn.
///
/// The partition owns the storage environment, routes transactions, and
/// exposes the directory operations. All operations on a closed partition
/// fail with an invalid-operation error.
pub struct Partition {
    config: PartitionConfig,
    store: Arc<PartitionStore>,
    exec: ExecutionManager,
    gauge: TransactionGauge,
    is_open: RwLock<bool>,
}

impl Partition {
    /// Opens a partition on a fresh in-memory environment.
    pub fn open(config: PartitionConfig) -> DirResult<Self> {
        Self::open_on(config, StorageEnv::new())
    }

    /// Opens a partition on an existing environment.
    ///
    /// Creates any missing system and configured index trees, and deletes
    /// index trees left behind by indices that are no longer configured.
    pub fn open_on(config: PartitionConfig, env: StorageEnv) -> DirResult<Self> {
        let schema = SchemaRegistry::with_core_schema();
        let store = Arc::new(PartitionStore::new(
            schema,
            config.suffix().clone(),
            env,
        ));

        {
            let mut user_indices = store.user_indices.write();
            for name in config.indexed_attributes() {
                let oid = store.schema.resolve_oid(name);
                user_indices
                    .entry(oid.clone())
                    .or_insert_with(|| Arc::new(store.make_user_index(&oid)));
            }
        }

        let mut txn = WriteTransaction::new(store.env.begin_write()?, None);
        store.create_system_trees(&mut txn)?;
        for index in store.user_indices.read().values() {
            index.create(&mut txn)?;
        }

        // delete index trees for attributes no longer configured
        let known = store.known_index_oids();
        for name in txn.tree_names() {
            let Some(oid) = name
                .strip_suffix("_forward")
                .or_else(|| name.strip_suffix("_reverse"))
            else {
                continue;
            };
            if !known.iter().any(|k| k == oid) {
                tracing::debug!(tree = %name, "deleting orphaned index tree");
                txn.delete_tree(&name)?;
            }
        }
        txn.commit()?;

        let exec = ExecutionManager::new(Arc::clone(&store));
        tracing::info!(suffix = %config.suffix(), "partition opened");
        Ok(Self {
            config,
            store,
            exec,
            gauge: TransactionGauge::new(),
            is_open: RwLock::new(true),
        })
    }

    /// Returns the partition suffix.
    #[must_use]
    pub fn suffix(&self) -> &Dn {
        self.config.suffix()
    }

    /// Returns the partition configuration.
    #[must_use]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Returns the number of currently open transactions.
    #[must_use]
    pub fn open_transaction_count(&self) -> i64 {
        self.gauge.open_count()
    }

    fn ensure_open(&self) -> DirResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(DirectoryError::invalid_operation("partition is not open"))
        }
    }

    /// Closes the partition. Fails if transactions are still open.
    pub fn close(&self) -> DirResult<()> {
        self.ensure_open()?;
        let open = self.gauge.open_count();
        if open > 0 {
            return Err(DirectoryError::invalid_operation(format!(
                "cannot close partition with {open} open transactions"
            )));
        }
        *self.is_open.write() = false;
        tracing::info!(suffix = %self.config.suffix(), "partition closed");
        Ok(())
    }

    /// Deletes every tree of the partition and closes it.
    pub fn destroy(&self) -> DirResult<()> {
        self.ensure_open()?;
        let mut txn = self.begin_write()?;
        for name in txn.tree_names() {
            txn.delete_tree(&name)?;
        }
        txn.commit()?;
        *self.is_open.write() = false;
        tracing::info!(suffix = %self.config.suffix(), "partition destroyed");
        Ok(())
    }

    /// Begins a snapshot-isolated read transaction.
    pub fn begin_read(&self) -> DirResult<ReadTransaction> {
        self.ensure_open()?;
        Ok(ReadTransaction::new(
            self.store.env.begin_read()?,
            Some(self.gauge.track()),
        ))
    }

    /// Begins the exclusive write transaction.
    pub fn begin_write(&self) -> DirResult<WriteTransaction> {
        self.ensure_open()?;
        Ok(WriteTransaction::new(
            self.store.env.begin_write()?,
            Some(self.gauge.track()),
        ))
    }

    /// Runs `f` inside a write transaction, committing on success and
    /// aborting on error.
    pub fn write_transaction<T>(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> DirResult<T>,
    ) -> DirResult<T> {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.close();
                Err(e)
            }
        }
    }

    /// Adds an entry in its own transaction.
    pub fn add(&self, entry: Entry) -> DirResult<ChangeSet> {
        self.write_transaction(|txn| self.exec.add(txn, entry))
    }

    /// Adds an entry inside the caller's transaction.
    pub fn add_in(&self, txn: &mut WriteTransaction, entry: Entry) -> DirResult<ChangeSet> {
        self.ensure_open()?;
        self.exec.add(txn, entry)
    }

    /// Deletes a leaf entry in its own transaction.
    pub fn delete(&self, dn: &Dn) -> DirResult<ChangeSet> {
        self.write_transaction(|txn| self.exec.delete(txn, dn))
    }

    /// Deletes a leaf entry inside the caller's transaction.
    pub fn delete_in(&self, txn: &mut WriteTransaction, dn: &Dn) -> DirResult<ChangeSet> {
        self.ensure_open()?;
        self.exec.delete(txn, dn)
    }

    /// Modifies an entry in its own transaction.
    pub fn modify(&self, dn: &Dn, mods: &[Modification]) -> DirResult<ChangeSet> {
        self.write_transaction(|txn| self.exec.modify(txn, dn, mods))
    }

    /// Modifies an entry inside the caller's transaction.
    pub fn modify_in(
        &self,
        txn: &mut WriteTransaction,
        dn: &Dn,
        mods: &[Modification],
    ) -> DirResult<ChangeSet> {
        self.ensure_open()?;
        self.exec.modify(txn, dn, mods)
    }

    /// Looks up an entry by Dn.
    ///
    /// The returned entry is a detached snapshot; feeding it back into a
    /// write path is a programming error.
    pub fn lookup(&self, dn: &Dn) -> DirResult<Option<Entry>> {
        let mut txn = self.begin_read()?;
        let result = self.lookup_in(&txn, dn);
        txn.close();
        result
    }

    /// Looks up an entry by Dn inside the caller's transaction.
    pub fn lookup_in(&self, txn: &dyn TreeView, dn: &Dn) -> DirResult<Option<Entry>> {
        match self.store.entry_id(txn, dn)? {
            Some(id) => self.lookup_by_id_in(txn, id),
            None => Ok(None),
        }
    }

    /// Looks up an entry by id.
    pub fn lookup_by_id(&self, id: EntryId) -> DirResult<Option<Entry>> {
        let mut txn = self.begin_read()?;
        let result = self.lookup_by_id_in(&txn, id);
        txn.close();
        result
    }

    /// Looks up an entry by id inside the caller's transaction.
    pub fn lookup_by_id_in(&self, txn: &dyn TreeView, id: EntryId) -> DirResult<Option<Entry>> {
        Ok(self.store.master.get(txn, id)?.map(|mut entry| {
            entry.mark_detached();
            entry
        }))
    }

    /// Resolves a Dn to its entry id.
    pub fn entry_id(&self, dn: &Dn) -> DirResult<Option<EntryId>> {
        let mut txn = self.begin_read()?;
        let result = self.store.entry_id(&txn, dn);
        txn.close();
        result
    }

    /// Returns whether an entry exists at `dn`.
    pub fn has_entry(&self, dn: &Dn) -> DirResult<bool> {
        Ok(self.entry_id(dn)?.is_some())
    }

    /// Returns the number of entries in the partition.
    pub fn count(&self) -> DirResult<usize> {
        let mut txn = self.begin_read()?;
        let result = self.store.master.count(&txn);
        txn.close();
        result
    }

    /// Registers a user attribute index and back-fills it from the master
    /// table.
    ///
    /// A no-op if the attribute is already indexed.
    pub fn add_index(&self, name_or_oid: &str) -> DirResult<()> {
        self.ensure_open()?;
        let oid = self.store.schema.resolve_oid(name_or_oid);
        if self.store.user_index(&oid).is_some() {
            return Ok(());
        }
        let index = Arc::new(self.store.make_user_index(&oid));

        let store = Arc::clone(&self.store);
        self.write_transaction(|txn| {
            index.create(txn)?;
            let mut entries = Vec::new();
            let mut cursor = store.master.cursor(txn)?;
            while cursor.next() {
                entries.push(cursor.get()?);
            }
            for (id, entry) in entries {
                if let Some(attribute) = entry.get(&oid) {
                    store.presence_idx.add(txn, &oid, id)?;
                    for value in attribute.values() {
                        let key = store.schema.normalize_value(&oid, value);
                        index.add(txn, &key, id)?;
                    }
                }
            }
            Ok(())
        })?;

        self.store.user_indices.write().insert(oid.clone(), index);
        tracing::info!(oid = %oid, "index added and back-filled");
        Ok(())
    }

    /// Rebuilds every index from the master table.
    ///
    /// All index trees are cleared and re-derived; alias pairings are
    /// re-staged in a second pass once the hierarchy index is complete.
    pub fn rebuild_indexes(&self) -> DirResult<()> {
        self.ensure_open()?;
        let store = Arc::clone(&self.store);
        self.write_transaction(|txn| {
            let mut entries = Vec::new();
            let mut cursor = store.master.cursor(txn)?;
            while cursor.next() {
                entries.push(cursor.get()?);
            }
            store.clear_indices(txn)?;

            let by_dn: HashMap<Dn, EntryId> = entries
                .iter()
                .map(|(id, entry)| (entry.dn().clone(), *id))
                .collect();

            for (id, entry) in &entries {
                let dn = entry.dn();
                let (parent_id, rdn_key) = if *dn == store.suffix {
                    (
                        EntryId::ROOT,
                        ParentIdAndRdn::new(EntryId::ROOT, store.suffix.rdns().to_vec()),
                    )
                } else {
                    let parent_dn = dn.parent().ok_or_else(|| {
                        DirectoryError::invalid_operation(format!(
                            "stored entry {dn} has no parent inside the suffix"
                        ))
                    })?;
                    let parent_id = *by_dn.get(&parent_dn).ok_or_else(|| {
                        DirectoryError::invalid_operation(format!(
                            "stored entry {dn} is orphaned: no entry at {parent_dn}"
                        ))
                    })?;
                    (parent_id, ParentIdAndRdn::single(parent_id, dn.rdn().clone()))
                };

                let mut ancestors = Vec::new();
                let mut current = dn.clone();
                while current != store.suffix {
                    let Some(up) = current.parent() else {
                        break;
                    };
                    if let Some(ancestor_id) = by_dn.get(&up) {
                        ancestors.push(*ancestor_id);
                    }
                    current = up;
                }

                let mut changes = ChangeSet::new(*id);
                self.exec.stage_entry_indices(
                    txn,
                    &mut changes,
                    *id,
                    parent_id,
                    &rdn_key,
                    &ancestors,
                    entry,
                )?;
            }

            for (id, entry) in &entries {
                if entry.is_alias() {
                    let mut changes = ChangeSet::new(*id);
                    self.exec.stage_alias_indices(txn, &mut changes, *id, entry)?;
                }
            }
            Ok(())
        })?;
        tracing::info!(suffix = %self.config.suffix(), "indexes rebuilt");
        Ok(())
    }
}
