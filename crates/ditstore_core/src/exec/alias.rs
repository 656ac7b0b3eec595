//! Alias index maintenance.
//!
//! An alias entry carries a target Dn. Three indices track aliases so
//! search dereferencing never has to read entries: the alias index (target
//! Dn to alias id) and the one-level and subtree alias indices (ancestor
//! id to target id). An ancestor that already dominates the target gets no
//! pairing, since dereferencing there would find the target anyway.

use super::changes::ChangeSet;
use super::{record_add, record_drop};
use crate::error::{DirResult, DirectoryError};
use crate::name::Dn;
use crate::partition::PartitionStore;
use crate::txn::WriteTransaction;
use crate::types::EntryId;

/// Stages all alias index pairings for a new or re-targeted alias.
pub(super) fn add_alias_indices(
    store: &PartitionStore,
    txn: &mut WriteTransaction,
    changes: &mut ChangeSet,
    alias_id: EntryId,
    alias_dn: &Dn,
    target: &Dn,
) -> DirResult<()> {
    if !store.suffix.is_ancestor_of_or_equal(target) {
        return Err(DirectoryError::alias_dereferencing(format!(
            "alias target {target} is outside the partition suffix {}",
            store.suffix
        )));
    }
    let target_id = store
        .entry_id(txn, target)?
        .ok_or_else(|| DirectoryError::alias_broken_target(target.to_string()))?;
    if store.alias_idx.reverse_has(txn, target_id)? {
        return Err(DirectoryError::alias_dereferencing(format!(
            "alias target {target} is itself an alias"
        )));
    }

    record_add(txn, &store.alias_idx, target, alias_id, changes)?;

    let Some(parent_dn) = alias_dn.parent() else {
        return Ok(());
    };
    let parent_id = store
        .entry_id(txn, &parent_dn)?
        .ok_or_else(|| DirectoryError::no_such_object(parent_dn.to_string()))?;

    if !parent_dn.is_ancestor_of_or_equal(target) {
        record_add(txn, &store.one_alias_idx, &parent_id, target_id, changes)?;
    }

    let mut ancestor_dn = parent_dn;
    let mut ancestor_id = parent_id;
    while ancestor_dn != store.suffix {
        if !ancestor_dn.is_ancestor_of_or_equal(target) {
            record_add(txn, &store.sub_alias_idx, &ancestor_id, target_id, changes)?;
        }
        let Some(up) = ancestor_dn.parent() else {
            break;
        };
        ancestor_id = store
            .entry_id(txn, &up)?
            .ok_or_else(|| DirectoryError::no_such_object(up.to_string()))?;
        ancestor_dn = up;
    }
    Ok(())
}

/// Removes the alias index pairings of an alias that is being deleted or
/// re-targeted.
///
/// A target that no longer resolves is tolerated: the alias mapping itself
/// is still cleaned up and the dangling scope pairings are logged rather
/// than failing the delete.
pub(super) fn drop_alias_indices(
    store: &PartitionStore,
    txn: &mut WriteTransaction,
    changes: &mut ChangeSet,
    alias_id: EntryId,
) -> DirResult<()> {
    let Some(target_dn) = store.alias_idx.reverse_lookup(txn, alias_id)? else {
        tracing::warn!(alias_id = %alias_id, "alias has no target mapping to drop");
        return Ok(());
    };

    // Tolerated inconsistency: the target may already be gone. Returning
    // early leaves the remaining alias pairings untouched rather than
    // failing the whole delete.
    let Some(target_id) = store.entry_id(txn, &target_dn)? else {
        tracing::warn!(
            alias_id = %alias_id,
            target = %target_dn,
            "alias target no longer resolves; skipping alias index teardown"
        );
        return Ok(());
    };
    let alias_dn = store.dn_of(txn, alias_id)?;

    if let Some(parent_dn) = alias_dn.parent() {
        if let Some(parent_id) = store.entry_id(txn, &parent_dn)? {
            if !parent_dn.is_ancestor_of_or_equal(&target_dn) {
                record_drop(txn, &store.one_alias_idx, &parent_id, target_id, changes)?;
            }

            let mut ancestor_dn = parent_dn;
            let mut ancestor_id = parent_id;
            while ancestor_dn != store.suffix {
                if !ancestor_dn.is_ancestor_of_or_equal(&target_dn) {
                    record_drop(txn, &store.sub_alias_idx, &ancestor_id, target_id, changes)?;
                }
                let Some(up) = ancestor_dn.parent() else {
                    break;
                };
                match store.entry_id(txn, &up)? {
                    Some(id) => ancestor_id = id,
                    None => break,
                }
                ancestor_dn = up;
            }
        }
    }

    record_drop(txn, &store.alias_idx, &target_dn, alias_id, changes)?;
    Ok(())
}
