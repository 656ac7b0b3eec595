//! Cursors over typed tables.
//!
//! A cursor wraps the snapshot of a tree taken when it was opened, so
//! concurrent writes in the owning transaction never move it. A cursor is
//! only readable after a positioning call (`first`, `last`, `next`,
//! `previous`) has returned `true`.

use super::Datum;
use crate::error::{DirResult, DirectoryError};
use ditstore_storage::TreeData;
use std::marker::PhantomData;
use std::sync::Arc;

/// Logical position of a table cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// No positioning call has been made yet.
    Unpositioned,
    /// Before the first pair.
    BeforeFirst,
    /// After the last pair.
    AfterLast,
    /// Just before the node at this index.
    BeforeNode(usize),
    /// On a (node, duplicate) pair.
    On { node: usize, dup: usize },
}

/// A bidirectional cursor over every (key, value) pair of a table, in key
/// order and value order within a key.
#[derive(Debug)]
pub struct TableCursor<K, V> {
    data: Arc<TreeData>,
    position: Position,
    valid: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Datum, V: Datum> TableCursor<K, V> {
    pub(super) fn new(data: Arc<TreeData>) -> Self {
        Self {
            data,
            position: Position::Unpositioned,
            valid: false,
            _marker: PhantomData,
        }
    }

    /// Positions the cursor before the first pair.
    pub fn before_first(&mut self) {
        self.position = Position::BeforeFirst;
        self.valid = false;
    }

    /// Positions the cursor after the last pair.
    pub fn after_last(&mut self) {
        self.position = Position::AfterLast;
        self.valid = false;
    }

    /// Positions the cursor so the next `next` call lands on the first key
    /// greater than or equal to `key`.
    pub fn before_key(&mut self, key: &K) -> DirResult<()> {
        let kb = key.encode()?;
        self.position = match self.data.seek(&kb) {
            Ok(pos) | Err(pos) => Position::BeforeNode(pos),
        };
        self.valid = false;
        Ok(())
    }

    /// Positions the cursor so the next `next` call lands on the first key
    /// strictly greater than `key`, and the next `previous` call on the
    /// last key less than or equal to it.
    pub fn after_key(&mut self, key: &K) -> DirResult<()> {
        let kb = key.encode()?;
        self.position = match self.data.seek(&kb) {
            Ok(pos) => Position::BeforeNode(pos + 1),
            Err(pos) => Position::BeforeNode(pos),
        };
        self.valid = false;
        Ok(())
    }

    /// Moves to the first pair. Returns `false` on an empty table.
    pub fn first(&mut self) -> bool {
        if self.data.is_empty() {
            self.position = Position::BeforeFirst;
            self.valid = false;
        } else {
            self.position = Position::On { node: 0, dup: 0 };
            self.valid = true;
        }
        self.valid
    }

    /// Moves to the last pair. Returns `false` on an empty table.
    pub fn last(&mut self) -> bool {
        match self.data.key_count().checked_sub(1) {
            None => {
                self.position = Position::AfterLast;
                self.valid = false;
            }
            Some(node) => {
                let dup = self.dup_count(node) - 1;
                self.position = Position::On { node, dup };
                self.valid = true;
            }
        }
        self.valid
    }

    /// Advances to the next pair. Returns `false` once exhausted.
    pub fn next(&mut self) -> bool {
        self.position = match self.position {
            Position::Unpositioned | Position::BeforeFirst => {
                return self.first();
            }
            Position::AfterLast => Position::AfterLast,
            Position::BeforeNode(node) => {
                if node < self.data.key_count() {
                    Position::On { node, dup: 0 }
                } else {
                    Position::AfterLast
                }
            }
            Position::On { node, dup } => {
                if dup + 1 < self.dup_count(node) {
                    Position::On { node, dup: dup + 1 }
                } else if node + 1 < self.data.key_count() {
                    Position::On {
                        node: node + 1,
                        dup: 0,
                    }
                } else {
                    Position::AfterLast
                }
            }
        };
        self.valid = matches!(self.position, Position::On { .. });
        self.valid
    }

    /// Steps back to the previous pair. Returns `false` once exhausted.
    pub fn previous(&mut self) -> bool {
        self.position = match self.position {
            Position::Unpositioned | Position::AfterLast => {
                return self.last();
            }
            Position::BeforeFirst => Position::BeforeFirst,
            Position::BeforeNode(node) => match node.checked_sub(1) {
                Some(prev) => Position::On {
                    node: prev,
                    dup: self.dup_count(prev) - 1,
                },
                None => Position::BeforeFirst,
            },
            Position::On { node, dup } => {
                if dup > 0 {
                    Position::On { node, dup: dup - 1 }
                } else {
                    match node.checked_sub(1) {
                        Some(prev) => Position::On {
                            node: prev,
                            dup: self.dup_count(prev) - 1,
                        },
                        None => Position::BeforeFirst,
                    }
                }
            }
        };
        self.valid = matches!(self.position, Position::On { .. });
        self.valid
    }

    /// Returns the pair under the cursor.
    pub fn get(&self) -> DirResult<(K, V)> {
        let Position::On { node, dup } = self.position else {
            return Err(DirectoryError::invalid_cursor(
                "cursor is not positioned on a pair",
            ));
        };
        if !self.valid {
            return Err(DirectoryError::invalid_cursor(
                "cursor position has not been validated",
            ));
        }
        let n = self
            .data
            .node(node)
            .ok_or_else(|| DirectoryError::invalid_cursor("cursor node out of range"))?;
        let value = n
            .values()
            .get(dup)
            .ok_or_else(|| DirectoryError::invalid_cursor("cursor value out of range"))?;
        Ok((K::decode(n.key())?, V::decode(value)?))
    }

    fn dup_count(&self, node: usize) -> usize {
        self.data.node(node).map_or(0, |n| n.values().len())
    }
}

/// A cursor scoped to the duplicate values of a single key.
///
/// The cursor walks values in value order and never crosses into another
/// key. Reverse-from-the-end positioning (`last`, `after_last`) is not
/// supported.
pub struct KeyCursor<K, V> {
    key: Vec<u8>,
    values: Vec<Vec<u8>>,
    /// Index of the value the cursor sits on; `None` before the first.
    index: Option<usize>,
    valid: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Datum, V: Datum> KeyCursor<K, V> {
    pub(super) fn new(data: Arc<TreeData>, key: &[u8]) -> Self {
        let values = data.get(key).map_or_else(Vec::new, |n| n.values().to_vec());
        Self {
            key: key.to_vec(),
            values,
            index: None,
            valid: false,
            _marker: PhantomData,
        }
    }

    /// Positions the cursor before the first value.
    pub fn before_first(&mut self) {
        self.index = None;
        self.valid = false;
    }

    /// Moves to the first value. Returns `false` if the key is absent.
    pub fn first(&mut self) -> bool {
        if self.values.is_empty() {
            self.index = None;
            self.valid = false;
        } else {
            self.index = Some(0);
            self.valid = true;
        }
        self.valid
    }

    /// Advances to the next value under the key.
    pub fn next(&mut self) -> bool {
        match self.index {
            None => return self.first(),
            Some(i) if i + 1 < self.values.len() => {
                self.index = Some(i + 1);
                self.valid = true;
            }
            Some(_) => {
                self.valid = false;
            }
        }
        self.valid
    }

    /// Steps back to the previous value under the key.
    pub fn previous(&mut self) -> bool {
        match self.index {
            Some(i) if self.valid && i > 0 => {
                self.index = Some(i - 1);
                self.valid = true;
            }
            _ => {
                self.index = None;
                self.valid = false;
            }
        }
        self.valid
    }

    /// Not supported on a key-scoped cursor.
    pub fn last(&mut self) -> DirResult<bool> {
        Err(DirectoryError::unsupported(
            "last is not supported on a key-scoped cursor",
        ))
    }

    /// Not supported on a key-scoped cursor.
    pub fn after_last(&mut self) -> DirResult<()> {
        Err(DirectoryError::unsupported(
            "after_last is not supported on a key-scoped cursor",
        ))
    }

    /// Returns the (key, value) pair under the cursor.
    pub fn get(&self) -> DirResult<(K, V)> {
        let Some(i) = self.index.filter(|_| self.valid) else {
            return Err(DirectoryError::invalid_cursor(
                "cursor is not positioned on a value",
            ));
        };
        Ok((K::decode(&self.key)?, V::decode(&self.values[i])?))
    }
}

/// A restartable cursor over the values of one key.
///
/// Works on both duplicate and non-duplicate tables; the value set is
/// captured when the cursor is opened.
pub struct ValueCursor<V> {
    values: Vec<Vec<u8>>,
    position: Position,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Datum> ValueCursor<V> {
    pub(super) fn new(values: Vec<Vec<u8>>) -> Self {
        Self {
            values,
            position: Position::Unpositioned,
            _marker: PhantomData,
        }
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the key had no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Positions the cursor before the first value.
    pub fn before_first(&mut self) {
        self.position = Position::BeforeFirst;
    }

    /// Positions the cursor after the last value.
    pub fn after_last(&mut self) {
        self.position = Position::AfterLast;
    }

    /// Moves to the first value.
    pub fn first(&mut self) -> bool {
        if self.values.is_empty() {
            self.position = Position::BeforeFirst;
            false
        } else {
            self.position = Position::On { node: 0, dup: 0 };
            true
        }
    }

    /// Moves to the last value.
    pub fn last(&mut self) -> bool {
        match self.values.len().checked_sub(1) {
            None => {
                self.position = Position::AfterLast;
                false
            }
            Some(i) => {
                self.position = Position::On { node: i, dup: 0 };
                true
            }
        }
    }

    /// Advances to the next value.
    pub fn next(&mut self) -> bool {
        match self.position {
            Position::Unpositioned | Position::BeforeFirst => self.first(),
            Position::AfterLast => false,
            Position::BeforeNode(_) => false,
            Position::On { node, .. } => {
                if node + 1 < self.values.len() {
                    self.position = Position::On {
                        node: node + 1,
                        dup: 0,
                    };
                    true
                } else {
                    self.position = Position::AfterLast;
                    false
                }
            }
        }
    }

    /// Steps back to the previous value.
    pub fn previous(&mut self) -> bool {
        match self.position {
            Position::Unpositioned | Position::AfterLast => self.last(),
            Position::BeforeFirst | Position::BeforeNode(_) => false,
            Position::On { node, .. } => match node.checked_sub(1) {
                Some(prev) => {
                    self.position = Position::On { node: prev, dup: 0 };
                    true
                }
                None => {
                    self.position = Position::BeforeFirst;
                    false
                }
            },
        }
    }

    /// Returns the value under the cursor.
    pub fn get(&self) -> DirResult<V> {
        let Position::On { node, .. } = self.position else {
            return Err(DirectoryError::invalid_cursor(
                "cursor is not positioned on a value",
            ));
        };
        V::decode(&self.values[node])
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CaseIgnoreComparator, Table};
    use super::*;
    use crate::error::DirectoryError;
    use crate::txn::tests::write_env;
    use crate::types::EntryId;

    fn populated(dups: bool) -> (crate::txn::WriteTransaction, Table<String, EntryId>) {
        let (_env, mut txn) = write_env();
        let table = Table::new("t", Arc::new(CaseIgnoreComparator), None, dups);
        table.create(&mut txn).unwrap();
        (txn, table)
    }

    fn id(byte: u8) -> EntryId {
        EntryId::from_bytes([byte; 16])
    }

    #[test]
    fn walk_forward_in_key_order() {
        let (mut txn, table) = populated(false);
        for (k, v) in [("c", 3), ("a", 1), ("b", 2)] {
            table.put(&mut txn, &k.to_string(), &id(v)).unwrap();
        }

        let mut cursor = table.cursor(&txn).unwrap();
        let mut keys = Vec::new();
        while cursor.next() {
            keys.push(cursor.get().unwrap().0);
        }
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(!cursor.next());
    }

    #[test]
    fn walk_backward() {
        let (mut txn, table) = populated(false);
        for k in ["a", "b"] {
            table.put(&mut txn, &k.to_string(), &id(1)).unwrap();
        }

        let mut cursor = table.cursor(&txn).unwrap();
        cursor.after_last();
        assert!(cursor.previous());
        assert_eq!(cursor.get().unwrap().0, "b");
        assert!(cursor.previous());
        assert_eq!(cursor.get().unwrap().0, "a");
        assert!(!cursor.previous());
    }

    #[test]
    fn duplicates_visited_in_value_order() {
        let (mut txn, table) = populated(true);
        table.put(&mut txn, &"k".to_string(), &id(2)).unwrap();
        table.put(&mut txn, &"k".to_string(), &id(1)).unwrap();

        let mut cursor = table.cursor(&txn).unwrap();
        assert!(cursor.first());
        assert_eq!(cursor.get().unwrap().1, id(1));
        assert!(cursor.next());
        assert_eq!(cursor.get().unwrap().1, id(2));
        assert!(!cursor.next());
    }

    #[test]
    fn get_before_positioning_is_an_error() {
        let (txn, table) = populated(false);

        let cursor = table.cursor(&txn).unwrap();
        assert!(matches!(
            cursor.get(),
            Err(DirectoryError::InvalidCursorState { .. })
        ));
    }

    #[test]
    fn before_and_after_key_positioning() {
        let (mut txn, table) = populated(false);
        for k in ["b", "d", "f"] {
            table.put(&mut txn, &k.to_string(), &id(1)).unwrap();
        }

        let mut cursor = table.cursor(&txn).unwrap();
        cursor.before_key(&"d".to_string()).unwrap();
        assert!(cursor.next());
        assert_eq!(cursor.get().unwrap().0, "d");

        cursor.after_key(&"d".to_string()).unwrap();
        assert!(cursor.next());
        assert_eq!(cursor.get().unwrap().0, "f");

        cursor.after_key(&"d".to_string()).unwrap();
        assert!(cursor.previous());
        assert_eq!(cursor.get().unwrap().0, "d");
    }

    #[test]
    fn cursor_is_stable_under_writes() {
        let (mut txn, table) = populated(false);
        table.put(&mut txn, &"a".to_string(), &id(1)).unwrap();

        let mut cursor = table.cursor(&txn).unwrap();
        table.put(&mut txn, &"b".to_string(), &id(2)).unwrap();

        assert!(cursor.first());
        assert!(!cursor.next());
    }

    #[test]
    fn key_cursor_never_crosses_keys() {
        let (mut txn, table) = populated(true);
        table.put(&mut txn, &"k".to_string(), &id(1)).unwrap();
        table.put(&mut txn, &"k".to_string(), &id(2)).unwrap();
        table.put(&mut txn, &"z".to_string(), &id(9)).unwrap();

        let mut cursor = table.key_cursor(&txn, &"k".to_string()).unwrap();
        assert!(cursor.first());
        assert_eq!(cursor.get().unwrap().1, id(1));
        assert!(cursor.next());
        assert_eq!(cursor.get().unwrap().1, id(2));
        assert!(!cursor.next());
    }

    #[test]
    fn key_cursor_rejects_last() {
        let (mut txn, table) = populated(true);
        table.put(&mut txn, &"k".to_string(), &id(1)).unwrap();

        let mut cursor = table.key_cursor(&txn, &"k".to_string()).unwrap();
        assert!(cursor.last().is_err());
        assert!(cursor.after_last().is_err());
    }

    #[test]
    fn key_cursor_on_absent_key_is_empty() {
        let (txn, table) = populated(true);

        let mut cursor = table.key_cursor(&txn, &"nope".to_string()).unwrap();
        assert!(!cursor.first());
        assert!(cursor.get().is_err());
    }

    #[test]
    fn value_cursor_restarts() {
        let (mut txn, table) = populated(true);
        table.put(&mut txn, &"k".to_string(), &id(1)).unwrap();
        table.put(&mut txn, &"k".to_string(), &id(2)).unwrap();

        let mut cursor = table.value_cursor(&txn, &"k".to_string()).unwrap();
        assert_eq!(cursor.len(), 2);

        assert!(cursor.first());
        assert_eq!(cursor.get().unwrap(), id(1));
        assert!(cursor.next());
        assert!(!cursor.next());

        cursor.before_first();
        assert!(cursor.next());
        assert_eq!(cursor.get().unwrap(), id(1));

        assert!(cursor.last());
        assert_eq!(cursor.get().unwrap(), id(2));
        assert!(cursor.previous());
        assert_eq!(cursor.get().unwrap(), id(1));
        assert!(!cursor.previous());
    }

    #[test]
    fn value_cursor_on_non_duplicate_table() {
        let (mut txn, table) = populated(false);
        table.put(&mut txn, &"k".to_string(), &id(7)).unwrap();

        let mut cursor = table.value_cursor(&txn, &"k".to_string()).unwrap();
        assert_eq!(cursor.len(), 1);
        assert!(cursor.first());
        assert_eq!(cursor.get().unwrap(), id(7));
    }
}
