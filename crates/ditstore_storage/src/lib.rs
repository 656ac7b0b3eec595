//! # DitStore Storage
//!
//! Ordered tree environment for DitStore.
//!
//! This crate provides the lowest-level storage abstraction for DitStore:
//! named, sorted key-to-values trees with **externally supplied byte
//! comparators** and optional duplicate values per key. Trees are opaque at
//! this level - keys and values are byte strings, and the comparators that
//! define their order are handed in by the layer that owns the serialization
//! format.
//!
//! ## Design Principles
//!
//! - Trees are sorted byte stores; ordering is owned by the caller's
//!   comparators, never by this crate
//! - Duplicate values under one key are themselves sorted (by the value
//!   comparator) and inserted with no-duplicate-data semantics
//! - The environment hands out transaction handles: snapshot-isolated
//!   readers and a single exclusive writer working on a copy-on-write
//!   snapshot that is published atomically on commit
//!
//! ## Example
//!
//! ```rust
//! use ditstore_storage::{StorageEnv, TreeConfig, TreeView};
//!
//! let env = StorageEnv::new();
//! let mut wtxn = env.begin_write().unwrap();
//! wtxn.create_tree("demo", TreeConfig::byte_ordered(false)).unwrap();
//! wtxn.tree_mut("demo").unwrap().insert(b"k", b"v");
//! wtxn.commit().unwrap();
//!
//! let rtxn = env.begin_read().unwrap();
//! let tree = rtxn.tree("demo").unwrap();
//! assert!(tree.get(b"k").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod error;
mod tree;

pub use env::{ReadTxn, Snapshot, StorageEnv, TreeView, TxnState, WriteTxn};
pub use error::{StorageError, StorageResult};
pub use tree::{ByteCompare, Node, TreeConfig, TreeData};
