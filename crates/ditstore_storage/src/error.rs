//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A named tree does not exist in the environment.
    #[error("tree not found: {name}")]
    TreeNotFound {
        /// Name of the missing tree.
        name: String,
    },

    /// A named tree already exists in the environment.
    #[error("tree already exists: {name}")]
    TreeExists {
        /// Name of the conflicting tree.
        name: String,
    },

    /// The transaction is no longer active.
    #[error("transaction not active: {state}")]
    TransactionNotActive {
        /// The state the transaction was found in.
        state: &'static str,
    },
}
