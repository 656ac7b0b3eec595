//! Directory-level transaction handles.
//!
//! Thin wrappers around the storage transactions that surface failures as
//! [`DirectoryError`] and feed the partition's open-transaction gauge.

use crate::error::DirResult;
use ditstore_storage::{ReadTxn, TreeConfig, TreeData, TreeView, WriteTxn};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Counts the transactions a partition currently has open.
///
/// The count is diagnostic: a partition that refuses to close because of
/// outstanding transactions reports it, and a steadily growing value
/// points at a handle leak.
#[derive(Debug, Clone, Default)]
pub struct TransactionGauge {
    open: Arc<AtomicI64>,
}

impl TransactionGauge {
    /// Creates a gauge with no open transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of currently open transactions.
    #[must_use]
    pub fn open_count(&self) -> i64 {
        self.open.load(Ordering::SeqCst)
    }

    /// Registers one open transaction for the guard's lifetime.
    #[must_use]
    pub fn track(&self) -> GaugeGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        GaugeGuard {
            open: Arc::clone(&self.open),
        }
    }
}

/// Decrements the owning gauge when dropped.
#[derive(Debug)]
pub struct GaugeGuard {
    open: Arc<AtomicI64>,
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A snapshot-isolated read transaction over a partition.
#[derive(Debug)]
pub struct ReadTransaction {
    inner: ReadTxn,
    _gauge: Option<GaugeGuard>,
}

impl ReadTransaction {
    pub(crate) fn new(inner: ReadTxn, gauge: Option<GaugeGuard>) -> Self {
        Self {
            inner,
            _gauge: gauge,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Commits the transaction.
    pub fn commit(&mut self) -> DirResult<()> {
        Ok(self.inner.commit()?)
    }

    /// Aborts the transaction.
    pub fn abort(&mut self) -> DirResult<()> {
        Ok(self.inner.abort()?)
    }

    /// Closes the transaction, aborting if still active. Idempotent.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl TreeView for ReadTransaction {
    fn tree(&self, name: &str) -> ditstore_storage::StorageResult<Arc<TreeData>> {
        self.inner.tree(name)
    }

    fn tree_names(&self) -> Vec<String> {
        self.inner.tree_names()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

/// The exclusive write transaction over a partition.
///
/// Dropping an active handle aborts it, discarding all staged changes.
#[derive(Debug)]
pub struct WriteTransaction {
    inner: WriteTxn,
    _gauge: Option<GaugeGuard>,
}

impl WriteTransaction {
    pub(crate) fn new(inner: WriteTxn, gauge: Option<GaugeGuard>) -> Self {
        Self {
            inner,
            _gauge: gauge,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Creates a named tree; a no-op error if the name is taken.
    pub fn create_tree(&mut self, name: &str, config: TreeConfig) -> DirResult<()> {
        Ok(self.inner.create_tree(name, config)?)
    }

    /// Deletes a named tree and all its data.
    pub fn delete_tree(&mut self, name: &str) -> DirResult<()> {
        Ok(self.inner.delete_tree(name)?)
    }

    /// Returns mutable access to a tree, copying it on first touch.
    pub fn tree_mut(&mut self, name: &str) -> DirResult<&mut TreeData> {
        Ok(self.inner.tree_mut(name)?)
    }

    /// Publishes all staged changes atomically.
    pub fn commit(&mut self) -> DirResult<()> {
        Ok(self.inner.commit()?)
    }

    /// Discards all staged changes.
    pub fn abort(&mut self) -> DirResult<()> {
        Ok(self.inner.abort()?)
    }

    /// Closes the transaction, aborting if still active. Idempotent.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl TreeView for WriteTransaction {
    fn tree(&self, name: &str) -> ditstore_storage::StorageResult<Arc<TreeData>> {
        self.inner.tree(name)
    }

    fn tree_names(&self) -> Vec<String> {
        self.inner.tree_names()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ditstore_storage::StorageEnv;

    /// Opens a fresh environment and an untracked write transaction on it.
    pub(crate) fn write_env() -> (StorageEnv, WriteTransaction) {
        let env = StorageEnv::new();
        let txn = WriteTransaction::new(env.begin_write().unwrap(), None);
        (env, txn)
    }

    #[test]
    fn gauge_tracks_guard_lifetimes() {
        let gauge = TransactionGauge::new();
        assert_eq!(gauge.open_count(), 0);

        let a = gauge.track();
        let b = gauge.track();
        assert_eq!(gauge.open_count(), 2);

        drop(a);
        assert_eq!(gauge.open_count(), 1);
        drop(b);
        assert_eq!(gauge.open_count(), 0);
    }

    #[test]
    fn commit_after_close_fails() {
        let (_env, mut txn) = write_env();
        txn.close();
        assert!(txn.commit().is_err());
        assert!(!txn.is_active());
    }

    #[test]
    fn tracked_transaction_releases_gauge_on_drop() {
        let gauge = TransactionGauge::new();
        let env = StorageEnv::new();
        {
            let _txn = WriteTransaction::new(env.begin_write().unwrap(), Some(gauge.track()));
            assert_eq!(gauge.open_count(), 1);
        }
        assert_eq!(gauge.open_count(), 0);
    }
}
