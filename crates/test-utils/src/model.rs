//! Reference model for differential testing.
//!
//! [`TreeModel`] is an ordered map of value stacks with the same observable
//! behaviour as the tree: the newest value wins lookups, and deleting pops
//! the newest value. [`apply_op`] runs one [`TreeOp`] against both and
//! reports the first divergence.

use std::{collections::BTreeMap, fmt::Debug};

use bptree::{Error, NaturalOrder, Tree};

/// One step of a randomized workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp<K> {
    /// Insert `value` under `key`.
    Insert {
        /// Key to insert under.
        key: K,
        /// Payload bytes.
        value: Vec<u8>,
    },
    /// Remove the newest value under `key`.
    Delete {
        /// Key to delete.
        key: K,
    },
    /// Look up the newest value under `key`.
    Get {
        /// Key to look up.
        key: K,
    },
    /// Scan at most `count` keys starting at `start`.
    ListFrom {
        /// First key to scan from, or `None` for the smallest key.
        start: Option<K>,
        /// Maximum number of records.
        count: usize,
    },
}

/// Ordered map of value stacks; the last element of each stack is newest.
#[derive(Debug, Clone, Default)]
pub struct TreeModel<K> {
    entries: BTreeMap<K, Vec<Vec<u8>>>,
}

impl<K: Ord + Clone> TreeModel<K> {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Pushes `value` onto the stack for `key`.
    pub fn insert(&mut self, key: K, value: Vec<u8>) {
        self.entries.entry(key).or_default().push(value);
    }

    /// Pops the newest value for `key`. Returns `false` if the key is absent.
    pub fn delete(&mut self, key: &K) -> bool {
        let Some(stack) = self.entries.get_mut(key) else {
            return false;
        };
        stack.pop();
        if stack.is_empty() {
            self.entries.remove(key);
        }
        true
    }

    /// Newest value for `key`.
    pub fn get(&self, key: &K) -> Option<&[u8]> {
        self.entries.get(key).and_then(|stack| stack.last()).map(Vec::as_slice)
    }

    /// All values for `key`, newest first.
    pub fn get_all(&self, key: &K) -> Vec<&[u8]> {
        self.entries
            .get(key)
            .map(|stack| stack.iter().rev().map(Vec::as_slice).collect())
            .unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the model holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values across all keys.
    pub fn value_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// `(key, copies, newest value)` for up to `count` keys from `start`.
    pub fn list_from(&self, start: Option<&K>, count: usize) -> Vec<(K, usize, Vec<u8>)> {
        let iter: Box<dyn Iterator<Item = (&K, &Vec<Vec<u8>>)>> = match start {
            Some(start) => Box::new(self.entries.range(start.clone()..)),
            None => Box::new(self.entries.iter()),
        };
        iter.take(count)
            .filter_map(|(key, stack)| {
                stack.last().map(|newest| (key.clone(), stack.len(), newest.clone()))
            })
            .collect()
    }
}

/// Applies `op` to both `tree` and `model` and compares the outcomes.
///
/// An insert the tree rejects with [`Error::PoolExhausted`] is skipped on
/// the model side, since a rejected insert must leave the tree unchanged.
///
/// # Errors
///
/// Returns a description of the first mismatch.
pub fn apply_op<K>(
    tree: &mut Tree<K, NaturalOrder>,
    model: &mut TreeModel<K>,
    op: &TreeOp<K>,
) -> Result<(), String>
where
    K: Ord + Clone + Debug,
{
    match op {
        TreeOp::Insert { key, value } => match tree.insert(key.clone(), value) {
            Ok(_) => model.insert(key.clone(), value.clone()),
            Err(Error::PoolExhausted { .. }) => {},
            Err(err) => return Err(format!("insert {key:?} failed: {err}")),
        },
        TreeOp::Delete { key } => {
            let expected = model.delete(key);
            match tree.delete(key) {
                Ok(()) if expected => {},
                Err(Error::KeyNotFound) if !expected => {},
                other => {
                    return Err(format!(
                        "delete {key:?}: tree returned {other:?}, model had key = {expected}"
                    ));
                },
            }
        },
        TreeOp::Get { key } => {
            let actual = tree.get(key).map_err(|err| format!("get {key:?} failed: {err}"))?;
            if actual != model.get(key) {
                return Err(format!(
                    "get {key:?}: tree {actual:?}, model {:?}",
                    model.get(key)
                ));
            }
        },
        TreeOp::ListFrom { start, count } => {
            let scan = tree
                .list_from(start.as_ref(), *count)
                .map_err(|err| format!("list_from {start:?} failed: {err}"))?;
            let mut actual = Vec::new();
            for record in scan {
                let record = record.map_err(|err| format!("scan failed: {err}"))?;
                actual.push((record.key.clone(), record.copies, record.value.to_vec()));
            }
            let expected = model.list_from(start.as_ref(), *count);
            if actual != expected {
                return Err(format!(
                    "list_from {start:?} x{count}: tree {actual:?}, model {expected:?}"
                ));
            }
        },
    }

    if tree.len() != model.len() || tree.value_count() != model.value_count() {
        return Err(format!(
            "counts diverged after {op:?}: tree {}/{}, model {}/{}",
            tree.len(),
            tree.value_count(),
            model.len(),
            model.value_count()
        ));
    }
    Ok(())
}
