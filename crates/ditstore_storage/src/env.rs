//! Storage environment and native transaction handles.

use crate::error::{StorageError, StorageResult};
use crate::tree::{TreeConfig, TreeData};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State of a native transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TxnState {
    fn name(self) -> &'static str {
        match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
        }
    }
}

/// An immutable view of every named tree at one point in time.
///
/// Snapshots are cheap to clone: trees are shared behind [`Arc`] and only
/// copied when a write transaction first touches them.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    trees: HashMap<String, Arc<TreeData>>,
}

impl Snapshot {
    fn tree(&self, name: &str) -> StorageResult<Arc<TreeData>> {
        self.trees
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TreeNotFound {
                name: name.to_string(),
            })
    }

    fn tree_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Read access to the trees visible from a transaction.
///
/// Implemented by both transaction kinds so read paths can be written once:
/// a [`ReadTxn`] resolves against its frozen snapshot, a [`WriteTxn`]
/// against its working snapshot (and therefore sees its own uncommitted
/// writes).
pub trait TreeView {
    /// Returns the named tree as seen by this transaction.
    ///
    /// The returned [`Arc`] is a stable snapshot: later writes in the same
    /// transaction do not show through it.
    fn tree(&self, name: &str) -> StorageResult<Arc<TreeData>>;

    /// Returns the names of all trees visible to this transaction, sorted.
    fn tree_names(&self) -> Vec<String>;

    /// Returns whether the named tree exists.
    fn has_tree(&self, name: &str) -> bool {
        self.tree(name).is_ok()
    }

    /// Returns whether the transaction is still active.
    fn is_active(&self) -> bool;
}

struct EnvInner {
    committed: RwLock<Snapshot>,
    write_lock: Arc<Mutex<()>>,
    next_txn_id: AtomicU64,
}

/// An environment owning a set of named trees.
///
/// The environment is the transaction source: [`StorageEnv::begin_read`]
/// hands out snapshot-isolated readers, [`StorageEnv::begin_write`] hands
/// out the single exclusive writer. Writers work on a copy-on-write clone of
/// the committed snapshot and publish it atomically on commit; an abort
/// simply discards the working copy.
///
/// Cloning the environment is cheap and shares the same underlying state.
#[derive(Clone)]
pub struct StorageEnv {
    inner: Arc<EnvInner>,
}

impl StorageEnv {
    /// Creates a new empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EnvInner {
                committed: RwLock::new(Snapshot::default()),
                write_lock: Arc::new(Mutex::new(())),
                next_txn_id: AtomicU64::new(1),
            }),
        }
    }

    /// Begins a snapshot-isolated read transaction.
    pub fn begin_read(&self) -> StorageResult<ReadTxn> {
        let id = self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst);
        Ok(ReadTxn {
            id,
            snapshot: self.inner.committed.read().clone(),
            state: TxnState::Active,
        })
    }

    /// Begins the exclusive write transaction.
    ///
    /// Blocks until no other write transaction is active. The write lock is
    /// held for the transaction's lifetime and released on commit, abort, or
    /// drop.
    pub fn begin_write(&self) -> StorageResult<WriteTxn> {
        let guard = Mutex::lock_arc(&self.inner.write_lock);
        let id = self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let working = self.inner.committed.read().clone();
        Ok(WriteTxn {
            id,
            inner: Arc::clone(&self.inner),
            working,
            state: TxnState::Active,
            guard: Some(guard),
        })
    }

    /// Returns the names of all committed trees, sorted.
    #[must_use]
    pub fn tree_names(&self) -> Vec<String> {
        self.inner.committed.read().tree_names()
    }
}

impl Default for StorageEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StorageEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEnv")
            .field("trees", &self.tree_names())
            .finish()
    }
}

/// A snapshot-isolated read transaction.
///
/// Readers never block writers and see the committed state as of
/// [`StorageEnv::begin_read`].
#[derive(Debug)]
pub struct ReadTxn {
    id: u64,
    snapshot: Snapshot,
    state: TxnState,
}

impl ReadTxn {
    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Commits the transaction (a no-op for readers beyond state tracking).
    pub fn commit(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Aborts the transaction.
    pub fn abort(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.state = TxnState::Aborted;
        Ok(())
    }

    /// Closes the transaction, aborting if still active. Idempotent.
    pub fn close(&mut self) {
        if self.state == TxnState::Active {
            self.state = TxnState::Aborted;
        }
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.state == TxnState::Active {
            Ok(())
        } else {
            Err(StorageError::TransactionNotActive {
                state: self.state.name(),
            })
        }
    }
}

impl TreeView for ReadTxn {
    fn tree(&self, name: &str) -> StorageResult<Arc<TreeData>> {
        self.snapshot.tree(name)
    }

    fn tree_names(&self) -> Vec<String> {
        self.snapshot.tree_names()
    }

    fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }
}

/// The exclusive write transaction.
///
/// All mutations - data and tree create/delete alike - are staged on a
/// working snapshot and become visible to other transactions only after
/// [`WriteTxn::commit`]. Dropping an active handle aborts it.
pub struct WriteTxn {
    id: u64,
    inner: Arc<EnvInner>,
    working: Snapshot,
    state: TxnState,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl WriteTxn {
    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Creates a named tree.
    ///
    /// Fails with [`StorageError::TreeExists`] if the name is taken.
    pub fn create_tree(&mut self, name: &str, config: TreeConfig) -> StorageResult<()> {
        self.ensure_active()?;
        if self.working.trees.contains_key(name) {
            return Err(StorageError::TreeExists {
                name: name.to_string(),
            });
        }
        self.working
            .trees
            .insert(name.to_string(), Arc::new(TreeData::new(config)));
        Ok(())
    }

    /// Deletes a named tree and all its data.
    pub fn delete_tree(&mut self, name: &str) -> StorageResult<()> {
        self.ensure_active()?;
        self.working
            .trees
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::TreeNotFound {
                name: name.to_string(),
            })
    }

    /// Returns mutable access to a tree's data, copying it on first touch.
    pub fn tree_mut(&mut self, name: &str) -> StorageResult<&mut TreeData> {
        self.ensure_active()?;
        let arc = self
            .working
            .trees
            .get_mut(name)
            .ok_or_else(|| StorageError::TreeNotFound {
                name: name.to_string(),
            })?;
        Ok(Arc::make_mut(arc))
    }

    /// Publishes the working snapshot as the new committed state.
    pub fn commit(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        *self.inner.committed.write() = self.working.clone();
        self.state = TxnState::Committed;
        self.guard = None;
        Ok(())
    }

    /// Discards the working snapshot.
    pub fn abort(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.state = TxnState::Aborted;
        self.guard = None;
        Ok(())
    }

    /// Closes the transaction, aborting if still active. Idempotent.
    pub fn close(&mut self) {
        if self.state == TxnState::Active {
            self.state = TxnState::Aborted;
            self.guard = None;
        }
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.state == TxnState::Active {
            Ok(())
        } else {
            Err(StorageError::TransactionNotActive {
                state: self.state.name(),
            })
        }
    }
}

impl TreeView for WriteTxn {
    fn tree(&self, name: &str) -> StorageResult<Arc<TreeData>> {
        self.working.tree(name)
    }

    fn tree_names(&self) -> Vec<String> {
        self.working.tree_names()
    }

    fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WriteTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTxn")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_tree(name: &str) -> StorageEnv {
        let env = StorageEnv::new();
        let mut wtxn = env.begin_write().unwrap();
        wtxn.create_tree(name, TreeConfig::byte_ordered(true))
            .unwrap();
        wtxn.commit().unwrap();
        env
    }

    #[test]
    fn committed_writes_are_visible() {
        let env = env_with_tree("t");

        let mut wtxn = env.begin_write().unwrap();
        wtxn.tree_mut("t").unwrap().insert(b"k", b"v");
        wtxn.commit().unwrap();

        let rtxn = env.begin_read().unwrap();
        assert!(rtxn.tree("t").unwrap().get(b"k").is_some());
    }

    #[test]
    fn aborted_writes_are_discarded() {
        let env = env_with_tree("t");

        let mut wtxn = env.begin_write().unwrap();
        wtxn.tree_mut("t").unwrap().insert(b"k", b"v");
        wtxn.abort().unwrap();

        let rtxn = env.begin_read().unwrap();
        assert!(rtxn.tree("t").unwrap().get(b"k").is_none());
    }

    #[test]
    fn dropped_write_txn_aborts() {
        let env = env_with_tree("t");

        {
            let mut wtxn = env.begin_write().unwrap();
            wtxn.tree_mut("t").unwrap().insert(b"k", b"v");
            // dropped without commit
        }

        let rtxn = env.begin_read().unwrap();
        assert!(rtxn.tree("t").unwrap().get(b"k").is_none());
    }

    #[test]
    fn reader_snapshot_is_stable() {
        let env = env_with_tree("t");
        let rtxn = env.begin_read().unwrap();

        let mut wtxn = env.begin_write().unwrap();
        wtxn.tree_mut("t").unwrap().insert(b"k", b"v");
        wtxn.commit().unwrap();

        // The reader still sees the state at begin_read.
        assert!(rtxn.tree("t").unwrap().get(b"k").is_none());
    }

    #[test]
    fn writer_sees_own_uncommitted_writes() {
        let env = env_with_tree("t");

        let mut wtxn = env.begin_write().unwrap();
        wtxn.tree_mut("t").unwrap().insert(b"k", b"v");
        assert!(wtxn.tree("t").unwrap().get(b"k").is_some());
    }

    #[test]
    fn commit_is_not_repeatable() {
        let env = env_with_tree("t");
        let mut wtxn = env.begin_write().unwrap();
        wtxn.commit().unwrap();

        assert!(matches!(
            wtxn.commit(),
            Err(StorageError::TransactionNotActive { state: "committed" })
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let env = env_with_tree("t");
        let mut wtxn = env.begin_write().unwrap();
        wtxn.close();
        wtxn.close();
        assert_eq!(wtxn.state(), TxnState::Aborted);

        let mut rtxn = env.begin_read().unwrap();
        rtxn.close();
        rtxn.close();
        assert_eq!(rtxn.state(), TxnState::Aborted);
    }

    #[test]
    fn create_tree_twice_fails() {
        let env = env_with_tree("t");
        let mut wtxn = env.begin_write().unwrap();
        let result = wtxn.create_tree("t", TreeConfig::byte_ordered(false));
        assert!(matches!(result, Err(StorageError::TreeExists { .. })));
    }

    #[test]
    fn delete_tree_staged_until_commit() {
        let env = env_with_tree("t");

        let mut wtxn = env.begin_write().unwrap();
        wtxn.delete_tree("t").unwrap();
        wtxn.abort().unwrap();
        assert_eq!(env.tree_names(), vec!["t".to_string()]);

        let mut wtxn = env.begin_write().unwrap();
        wtxn.delete_tree("t").unwrap();
        wtxn.commit().unwrap();
        assert!(env.tree_names().is_empty());
    }

    #[test]
    fn missing_tree_is_an_error() {
        let env = StorageEnv::new();
        let rtxn = env.begin_read().unwrap();
        assert!(matches!(
            rtxn.tree("nope"),
            Err(StorageError::TreeNotFound { .. })
        ));
    }

    #[test]
    fn tree_names_sorted() {
        let env = StorageEnv::new();
        let mut wtxn = env.begin_write().unwrap();
        for name in ["b", "a", "c"] {
            wtxn.create_tree(name, TreeConfig::byte_ordered(false))
                .unwrap();
        }
        wtxn.commit().unwrap();
        assert_eq!(env.tree_names(), vec!["a", "b", "c"]);
    }
}
