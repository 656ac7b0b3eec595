//! Partition configuration.

use crate::name::Dn;

/// Configuration for a directory partition.
///
/// `cache_size` and `sync_on_commit` are opaque knobs forwarded to the
/// storage integration; the in-memory environment accepts and ignores
/// them.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    suffix: Dn,
    indexed_attributes: Vec<String>,
    cache_size: usize,
    sync_on_commit: bool,
}

impl PartitionConfig {
    /// Creates a configuration for a partition rooted at `suffix`.
    #[must_use]
    pub fn new(suffix: Dn) -> Self {
        Self {
            suffix,
            indexed_attributes: Vec::new(),
            cache_size: 1000,
            sync_on_commit: true,
        }
    }

    /// Adds a user attribute (name or OID) to index.
    #[must_use]
    pub fn index_attribute(mut self, name_or_oid: impl Into<String>) -> Self {
        self.indexed_attributes.push(name_or_oid.into());
        self
    }

    /// Sets the entry cache size.
    #[must_use]
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Sets whether commits are flushed synchronously.
    #[must_use]
    pub fn sync_on_commit(mut self, sync_on_commit: bool) -> Self {
        self.sync_on_commit = sync_on_commit;
        self
    }

    /// Returns the partition suffix.
    #[must_use]
    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    /// Returns the configured indexed attributes.
    #[must_use]
    pub fn indexed_attributes(&self) -> &[String] {
        &self.indexed_attributes
    }

    /// Returns the entry cache size.
    #[must_use]
    pub fn get_cache_size(&self) -> usize {
        self.cache_size
    }

    /// Returns whether commits are flushed synchronously.
    #[must_use]
    pub fn is_sync_on_commit(&self) -> bool {
        self.sync_on_commit
    }
}
