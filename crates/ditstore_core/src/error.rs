//! Error types for the directory partition engine.

use thiserror::Error;

/// Result type for directory operations.
pub type DirResult<T> = Result<T, DirectoryError>;

/// Errors surfaced by the directory partition engine.
///
/// Storage-level failures are wrapped and re-surfaced through this taxonomy
/// at the operation-execution boundary; nothing is retried automatically.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Storage environment error.
    #[error("storage error: {0}")]
    Storage(#[from] ditstore_storage::StorageError),

    /// Entry or key serialization failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A required operational attribute is missing or malformed.
    #[error("schema violation: {message}")]
    SchemaViolation {
        /// Description of the violation.
        message: String,
    },

    /// A Dn does not resolve to an entry.
    #[error("no such object: {dn}")]
    NoSuchObject {
        /// The Dn that failed to resolve.
        dn: String,
    },

    /// An add targeted a Dn that already resolves to an entry.
    #[error("entry already exists: {dn}")]
    EntryAlreadyExists {
        /// The conflicting Dn.
        dn: String,
    },

    /// A delete targeted an entry that still has children.
    #[error("entry not empty: {dn}")]
    NotEmpty {
        /// The Dn of the non-leaf entry.
        dn: String,
    },

    /// An alias violates a dereferencing constraint (target outside the
    /// partition suffix, or target is itself an alias).
    #[error("alias dereferencing problem: {message}")]
    AliasDereferencing {
        /// Description of the constraint violated.
        message: String,
    },

    /// An alias points at a Dn that does not resolve to an entry.
    #[error("alias target does not exist: {target}")]
    AliasBrokenTarget {
        /// The unresolvable target Dn.
        target: String,
    },

    /// A Dn string could not be parsed.
    #[error("invalid Dn: {message}")]
    InvalidDn {
        /// Description of the parse failure.
        message: String,
    },

    /// A duplicate-only operation was invoked on a non-duplicate table or
    /// cursor. This is a programming or configuration error, not a data
    /// condition.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// Description of the misuse.
        message: String,
    },

    /// A cursor was read without a successful positioning call.
    #[error("invalid cursor state: {message}")]
    InvalidCursorState {
        /// Description of the cursor state.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl DirectoryError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a schema violation error.
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    /// Creates a no-such-object error.
    pub fn no_such_object(dn: impl Into<String>) -> Self {
        Self::NoSuchObject { dn: dn.into() }
    }

    /// Creates an entry-already-exists error.
    pub fn entry_already_exists(dn: impl Into<String>) -> Self {
        Self::EntryAlreadyExists { dn: dn.into() }
    }

    /// Creates a not-empty error.
    pub fn not_empty(dn: impl Into<String>) -> Self {
        Self::NotEmpty { dn: dn.into() }
    }

    /// Creates an alias dereferencing error.
    pub fn alias_dereferencing(message: impl Into<String>) -> Self {
        Self::AliasDereferencing {
            message: message.into(),
        }
    }

    /// Creates a broken-alias-target error.
    pub fn alias_broken_target(target: impl Into<String>) -> Self {
        Self::AliasBrokenTarget {
            target: target.into(),
        }
    }

    /// Creates an invalid-Dn error.
    pub fn invalid_dn(message: impl Into<String>) -> Self {
        Self::InvalidDn {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid-cursor-state error.
    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursorState {
            message: message.into(),
        }
    }

    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
