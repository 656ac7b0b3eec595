//! # DitStore Core
//!
//! Indexed directory partition engine for DitStore.
//!
//! A [`Partition`] stores a subtree of a directory information tree rooted
//! at a suffix [`Dn`]. Entries live in a master table keyed by random
//! [`EntryId`]s; everything else is an index over the master table:
//!
//! - A hierarchy index mapping `(parent id, Rdn)` keys to entry ids, from
//!   which Dns are resolved and reconstructed
//! - System indices for objectClass, entryCSN, entryUUID, attribute
//!   presence, one-level and subtree scopes, and alias dereferencing
//! - User attribute indices configured per partition, with normalized
//!   keys supplied by a pluggable schema registry
//!
//! All mutation goes through add, delete, and modify operations that stage
//! every index pairing and the master-table write in one exclusive write
//! transaction, so a commit publishes the whole operation or nothing.
//! Readers get snapshot-isolated views and cursors that stay stable while
//! writers commit.
//!
//! ## Example
//!
//! ```rust
//! use ditstore_core::{oids, Attribute, Dn, Entry, Partition, PartitionConfig, Value};
//!
//! let suffix = Dn::parse("dc=example").unwrap();
//! let partition = Partition::open(PartitionConfig::new(suffix).index_attribute("cn")).unwrap();
//!
//! let mut entry = Entry::new(Dn::parse("dc=example").unwrap());
//! entry.put_attribute(Attribute::with_values(oids::OBJECT_CLASS, vec!["domain"]));
//! entry.add_value(oids::ENTRY_CSN, Value::from("0000000000000001#000000#001"));
//! entry.add_value(oids::ENTRY_UUID, Value::from("00000000-0000-4000-8000-000000000001"));
//! partition.add(entry).unwrap();
//!
//! assert!(partition.has_entry(&Dn::parse("DC=Example").unwrap()).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod exec;
mod index;
mod master;
mod name;
mod partition;
mod schema;
mod table;
mod txn;
mod types;

pub use config::PartitionConfig;
pub use entry::{oids, Attribute, Entry, Value};
pub use error::{DirResult, DirectoryError};
pub use exec::{
    ChangeSet, EntryChange, ExecutionManager, IndexChange, IndexOp, ModOp, Modification,
};
pub use index::rdn::{ParentIdAndRdn, ParentIdAndRdnComparator};
pub use index::Index;
pub use master::MasterTable;
pub use name::{Dn, Rdn};
pub use partition::{Partition, PartitionStore};
pub use schema::{AttributeType, SchemaRegistry};
pub use table::{
    CaseIgnoreComparator, Comparator, Datum, KeyCursor, NaturalComparator, Table, TableCursor,
    ValueCursor, RANGE_COUNT_CAP,
};
pub use txn::{GaugeGuard, ReadTransaction, TransactionGauge, WriteTransaction};
pub use types::{Csn, EntryId};
