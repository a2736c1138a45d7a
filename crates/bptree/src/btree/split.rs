//! Node splitting for the insertion path.
//!
//! # Algorithm Overview
//!
//! Insertion splits preemptively: a full node is split *before* the descent
//! enters it, so the parent always has room for the promoted separator and
//! no split ever has to propagate upward.
//!
//! 1. **Leaf split**: the upper half of the entries moves to a freshly
//!    allocated sibling; the left node keeps `ceil(n / 2)`. The sibling's
//!    first key is copied up as the separator, and the sibling is spliced
//!    into the leaf chain right after the split node.
//!
//! 2. **Internal split**: the median entry is promoted rather than copied.
//!    Its child becomes the sibling's first child, and the entries above it
//!    move to the sibling.
//!
//! 3. **Root split**: a new internal root is allocated with the old root as
//!    its only child, then that child is split like any other. This is the
//!    only place tree height grows.
//!
//! Siblings are always allocated before any entry moves, so a failed
//! allocation leaves the node untouched.

use tracing::trace;

use super::node::{Entry, InternalNode, LeafNode, Node};
use crate::{
    error::{Error, NodeKind, Result},
    pool::NodePool,
    types::Handle,
};

/// Result of splitting a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome<K> {
    /// The new (right) sibling.
    pub sibling: Handle,
    /// Separator to insert into the parent; every key in the sibling is
    /// greater than or equal to it.
    pub separator: K,
}

/// Splits the full node at `handle`, moving its upper half to a new sibling.
///
/// `capacity` sizes the sibling's entry vector.
///
/// # Errors
///
/// Returns [`Error::PoolExhausted`] if the sibling cannot be allocated, and
/// [`Error::NodeKindMismatch`] if `handle` holds a payload record.
pub fn split_node<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    handle: Handle,
    capacity: usize,
) -> Result<SplitOutcome<K>> {
    match pool.get(handle)?.kind() {
        NodeKind::Leaf => split_leaf(pool, handle, capacity),
        NodeKind::Internal => split_internal(pool, handle, capacity),
        found => Err(Error::NodeKindMismatch { handle, expected: NodeKind::Leaf, found }),
    }
}

fn split_leaf<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    handle: Handle,
    capacity: usize,
) -> Result<SplitOutcome<K>> {
    if pool.leaf(handle)?.entries.len() < 2 {
        return Err(Error::Corrupted {
            handle,
            reason: "leaf split needs at least two entries".to_string(),
        });
    }
    let sibling = pool.allocate(Node::Leaf(LeafNode::new(capacity)))?;

    let leaf = pool.leaf_mut(handle)?;
    let mid = leaf.entries.len().div_ceil(2);
    let upper = leaf.entries.split_off(mid);
    let next_leaf = std::mem::replace(&mut leaf.next_leaf, sibling);
    let separator = upper[0].key.clone();

    let right = pool.leaf_mut(sibling)?;
    right.entries.extend(upper);
    right.next_leaf = next_leaf;

    trace!(node = %handle, sibling = %sibling, left_entries = mid, "Split leaf");
    Ok(SplitOutcome { sibling, separator })
}

fn split_internal<K>(
    pool: &mut NodePool<Node<K>>,
    handle: Handle,
    capacity: usize,
) -> Result<SplitOutcome<K>> {
    if pool.internal(handle)?.entries.len() < 3 {
        return Err(Error::Corrupted {
            handle,
            reason: "internal split needs at least three entries".to_string(),
        });
    }
    let sibling = pool.allocate(Node::Internal(InternalNode::new(Handle::NONE, capacity)))?;

    let node = pool.internal_mut(handle)?;
    let mid = node.entries.len() / 2;
    let mut upper = node.entries.split_off(mid);
    let promoted = upper.remove(0);

    let right = pool.internal_mut(sibling)?;
    right.first_child = promoted.down;
    right.entries.extend(upper);

    trace!(node = %handle, sibling = %sibling, left_entries = mid, "Split internal node");
    Ok(SplitOutcome { sibling, separator: promoted.key })
}

/// Splits child `index` of `parent` and records the separator in `parent`.
///
/// The parent must not be full.
///
/// # Errors
///
/// Propagates allocation and node-kind errors from [`split_node`].
pub fn split_child<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    parent: Handle,
    index: usize,
    capacity: usize,
) -> Result<SplitOutcome<K>> {
    let child = pool.internal(parent)?.child(index);
    let outcome = split_node(pool, child, capacity)?;
    pool.internal_mut(parent)?
        .entries
        .insert(index, Entry::new(outcome.separator.clone(), outcome.sibling));
    Ok(outcome)
}

/// Splits the root under a newly allocated root and returns the new root.
///
/// Needs two free slots: the new root and the sibling.
///
/// # Errors
///
/// Returns [`Error::PoolExhausted`] if fewer than two slots are free; the
/// tree is left unchanged in that case.
pub fn split_root<K: Clone>(
    pool: &mut NodePool<Node<K>>,
    root: Handle,
    capacity: usize,
) -> Result<Handle> {
    if pool.free_count() < 2 {
        return Err(Error::PoolExhausted { capacity: pool.capacity() });
    }
    let new_root = pool.allocate(Node::Internal(InternalNode::new(root, capacity)))?;
    split_child(pool, new_root, 0, capacity)?;
    Ok(new_root)
}
