//! Shift and merge for the deletion path.
//!
//! # Algorithm Overview
//!
//! Deletion rebalances preemptively: before the descent enters a child that
//! sits at minimum occupancy, the child is topped up so that removing one
//! entry further down can never underflow it. The current node acts as the
//! *anchor*: it owns the separator between the child and the sibling being
//! used.
//!
//! Sibling preference, first match wins:
//!
//! 1. **Shift from left** if the left sibling has an entry to spare.
//! 2. **Shift from right** if the right sibling has an entry to spare.
//! 3. **Merge with left** if a left sibling exists.
//! 4. **Merge with right** otherwise.
//!
//! A shift moves exactly one entry and rewrites the anchor separator. For
//! leaves the moved key itself becomes the new separator; for internal nodes
//! the entry rotates through the anchor (the old separator comes down, the
//! sibling's boundary key goes up).
//!
//! A merge always folds the right node into the left node, releases the
//! right slot and removes the anchor separator. Internal merges pull that
//! separator down as the key of the right node's first child. Merges never
//! allocate.
//!
//! When a merge empties the root, [`collapse_root`] releases it and its
//! only child becomes the new root.

use tracing::{debug, trace};

use super::node::{Entry, Node};
use crate::{
    error::{Error, NodeKind, Result},
    pool::NodePool,
    types::Handle,
};

/// Which sibling a shift borrowed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    /// Last entry of the left sibling moved to the front of the child.
    FromLeft,
    /// First entry of the right sibling moved to the end of the child.
    FromRight,
}

/// Result of moving one entry between siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftOutcome {
    /// Sibling that gave up an entry.
    pub donor: Handle,
    /// Node that received it.
    pub receiver: Handle,
    /// Side of the receiver the donor sits on.
    pub direction: ShiftDirection,
}

/// Result of folding a right node into its left sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Left node, now holding both nodes' entries.
    pub survivor: Handle,
    /// Right node, returned to the pool.
    pub released: Handle,
}

/// What [`rebalance_child`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebalance {
    /// One entry was shifted into the child.
    Shift(ShiftOutcome),
    /// The child was merged with a sibling.
    Merge(MergeOutcome),
}

fn corrupt(handle: Handle, reason: &str) -> Error {
    Error::Corrupted { handle, reason: reason.to_string() }
}

/// Tops up child `index` of `anchor` if it holds `min_entries` or fewer.
///
/// Returns `None` when the child already has a spare entry.
///
/// # Errors
///
/// Returns [`Error::Corrupted`] if the anchor has no sibling to work with,
/// and node access errors for stale or mistyped handles.
pub fn rebalance_child<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    anchor: Handle,
    index: usize,
    min_entries: usize,
) -> Result<Option<Rebalance>> {
    let node = pool.internal(anchor)?;
    let child = node.child(index);
    if pool.entry_count(child)? > min_entries {
        return Ok(None);
    }

    let left = index.checked_sub(1).map(|i| node.child(i));
    let right = (index + 1 < node.child_count()).then(|| node.child(index + 1));

    if let Some(left) = left
        && pool.entry_count(left)? > min_entries
    {
        return shift_from_left(pool, anchor, index).map(|s| Some(Rebalance::Shift(s)));
    }
    if let Some(right) = right
        && pool.entry_count(right)? > min_entries
    {
        return shift_from_right(pool, anchor, index).map(|s| Some(Rebalance::Shift(s)));
    }
    if left.is_some() {
        return merge_children(pool, anchor, index - 1).map(|m| Some(Rebalance::Merge(m)));
    }
    if right.is_some() {
        return merge_children(pool, anchor, index).map(|m| Some(Rebalance::Merge(m)));
    }
    Err(corrupt(anchor, "child has no sibling to rebalance with"))
}

/// Moves the last entry of child `index - 1` to the front of child `index`.
///
/// # Errors
///
/// Returns [`Error::Corrupted`] if the left sibling is empty.
pub fn shift_from_left<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    anchor: Handle,
    index: usize,
) -> Result<ShiftOutcome> {
    let sep = index.checked_sub(1).ok_or_else(|| corrupt(anchor, "no left sibling"))?;
    let (left, child) = {
        let node = pool.internal(anchor)?;
        (node.child(sep), node.child(index))
    };

    if pool.get(child)?.is_leaf() {
        let (donor, receiver) = pool.leaf_pair_mut(left, child)?;
        let moved = donor.entries.pop().ok_or_else(|| corrupt(left, "empty left sibling"))?;
        let separator = moved.key.clone();
        receiver.entries.insert(0, moved);
        pool.internal_mut(anchor)?.entries[sep].key = separator;
    } else {
        let (donor, receiver) = pool.internal_pair_mut(left, child)?;
        let moved = donor.entries.pop().ok_or_else(|| corrupt(left, "empty left sibling"))?;
        let old_first = std::mem::replace(&mut receiver.first_child, moved.down);
        let down = std::mem::replace(&mut pool.internal_mut(anchor)?.entries[sep].key, moved.key);
        pool.internal_mut(child)?.entries.insert(0, Entry::new(down, old_first));
    }

    trace!(anchor = %anchor, donor = %left, receiver = %child, "Shifted entry from left sibling");
    Ok(ShiftOutcome { donor: left, receiver: child, direction: ShiftDirection::FromLeft })
}

/// Moves the first entry of child `index + 1` to the end of child `index`.
///
/// # Errors
///
/// Returns [`Error::Corrupted`] if the right sibling cannot spare an entry.
pub fn shift_from_right<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    anchor: Handle,
    index: usize,
) -> Result<ShiftOutcome> {
    let (child, right) = {
        let node = pool.internal(anchor)?;
        if index + 1 >= node.child_count() {
            return Err(corrupt(anchor, "no right sibling"));
        }
        (node.child(index), node.child(index + 1))
    };

    if pool.get(child)?.is_leaf() {
        let (receiver, donor) = pool.leaf_pair_mut(child, right)?;
        if donor.entries.len() < 2 {
            return Err(corrupt(right, "right sibling has no spare entry"));
        }
        let moved = donor.entries.remove(0);
        receiver.entries.push(moved);
        let separator = donor.entries[0].key.clone();
        pool.internal_mut(anchor)?.entries[index].key = separator;
    } else {
        let (_, donor) = pool.internal_pair_mut(child, right)?;
        if donor.entries.is_empty() {
            return Err(corrupt(right, "empty right sibling"));
        }
        let moved = donor.entries.remove(0);
        let old_first = std::mem::replace(&mut donor.first_child, moved.down);
        let down = std::mem::replace(&mut pool.internal_mut(anchor)?.entries[index].key, moved.key);
        pool.internal_mut(child)?.entries.push(Entry::new(down, old_first));
    }

    trace!(anchor = %anchor, donor = %right, receiver = %child, "Shifted entry from right sibling");
    Ok(ShiftOutcome { donor: right, receiver: child, direction: ShiftDirection::FromRight })
}

/// Folds child `index + 1` of `anchor` into child `index`.
///
/// # Errors
///
/// Returns [`Error::NodeKindMismatch`] if the two children are different
/// node variants.
pub fn merge_children<K>(
    pool: &mut NodePool<Node<K>>,
    anchor: Handle,
    index: usize,
) -> Result<MergeOutcome> {
    let (left, right) = {
        let node = pool.internal(anchor)?;
        if index >= node.entries.len() {
            return Err(corrupt(anchor, "no right sibling to merge"));
        }
        (node.child(index), node.child(index + 1))
    };
    let expected = pool.get(left)?.kind();
    let found = pool.get(right)?.kind();
    if expected != found || !matches!(expected, NodeKind::Leaf | NodeKind::Internal) {
        return Err(Error::NodeKindMismatch { handle: right, expected, found });
    }

    let separator = pool.internal_mut(anchor)?.entries.remove(index);
    match pool.release(right)? {
        Node::Leaf(right_node) => {
            let survivor = pool.leaf_mut(left)?;
            survivor.entries.extend(right_node.entries);
            survivor.next_leaf = right_node.next_leaf;
        },
        Node::Internal(right_node) => {
            let survivor = pool.internal_mut(left)?;
            survivor.entries.push(Entry::new(separator.key, right_node.first_child));
            survivor.entries.extend(right_node.entries);
        },
        other => {
            return Err(Error::NodeKindMismatch { handle: right, expected, found: other.kind() });
        },
    }

    debug!(anchor = %anchor, survivor = %left, released = %right, "Merged siblings");
    Ok(MergeOutcome { survivor: left, released: right })
}

/// Releases an internal root left with no entries and returns its only
/// child, the new root.
///
/// Returns `None` if the root still has entries or is a leaf.
///
/// # Errors
///
/// Returns [`Error::InvalidHandle`] if `root` is not an occupied slot.
pub fn collapse_root<K>(pool: &mut NodePool<Node<K>>, root: Handle) -> Result<Option<Handle>> {
    let child = match pool.get(root)? {
        Node::Internal(node) if node.entries.is_empty() => node.first_child,
        _ => return Ok(None),
    };
    pool.release(root)?;
    debug!(old_root = %root, new_root = %child, "Collapsed root");
    Ok(Some(child))
}
