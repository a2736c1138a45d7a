//! Node variants and in-node key search.
//!
//! Every pool slot holds one [`Node`]. Internal and leaf nodes share the
//! same entry layout, a sorted `Vec` of `(key, down)` pairs:
//!
//! ```text
//! Internal:  first_child │ (k1, c1) │ (k2, c2) │ ... │ (kn, cn)
//! Leaf:      next_leaf   │ (k1, p1) │ (k2, p2) │ ... │ (kn, pn)
//! ```
//!
//! In an internal node `first_child` holds keys below `k1` and `ci` holds
//! keys in `[ki, k(i+1))`. Children are numbered from 0 (`first_child`)
//! to `n` (`cn`). In a leaf, `pi` is the payload handle for `ki`.

use std::cmp::Ordering;

use crate::{
    error::{Error, NodeKind, Result},
    pool::NodePool,
    types::{Handle, KeyComparator},
};

/// A key with the handle it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K> {
    /// The key.
    pub key: K,
    /// Child handle (internal nodes) or payload handle (leaves).
    pub down: Handle,
}

impl<K> Entry<K> {
    /// Creates an entry.
    pub fn new(key: K, down: Handle) -> Self {
        Self { key, down }
    }
}

/// Branch node: routes searches to children.
#[derive(Debug, Clone)]
pub struct InternalNode<K> {
    /// Child holding keys below the first entry.
    pub first_child: Handle,
    /// Separator entries in ascending key order.
    pub entries: Vec<Entry<K>>,
}

impl<K> InternalNode<K> {
    /// Creates an internal node with the given first child and no entries.
    pub fn new(first_child: Handle, capacity: usize) -> Self {
        Self { first_child, entries: Vec::with_capacity(capacity) }
    }

    /// Number of children (`entries + 1`).
    pub fn child_count(&self) -> usize {
        self.entries.len() + 1
    }

    /// Returns child `index` (0 = first child).
    pub fn child(&self, index: usize) -> Handle {
        if index == 0 { self.first_child } else { self.entries[index - 1].down }
    }

    /// Replaces child `index` (0 = first child).
    pub fn set_child(&mut self, index: usize, handle: Handle) {
        if index == 0 {
            self.first_child = handle;
        } else {
            self.entries[index - 1].down = handle;
        }
    }

    /// Resolves the child whose subtree may contain `key`.
    pub fn child_index<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> usize {
        best_child(locate(&self.entries, key, cmp), self.entries.len())
    }
}

/// Leaf node: holds keys and payload handles.
#[derive(Debug, Clone)]
pub struct LeafNode<K> {
    /// Next leaf in ascending key order, or [`Handle::NONE`].
    pub next_leaf: Handle,
    /// Entries in ascending key order; keys are unique within the tree.
    pub entries: Vec<Entry<K>>,
}

impl<K> LeafNode<K> {
    /// Creates an empty leaf.
    pub fn new(capacity: usize) -> Self {
        Self { next_leaf: Handle::NONE, entries: Vec::with_capacity(capacity) }
    }

    /// Looks `key` up in this leaf.
    pub fn search<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> SearchResult {
        best_entry(locate(&self.entries, key, cmp), self.entries.len())
    }
}

/// A single payload referenced by exactly one leaf entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    /// Payload bytes.
    pub value: Vec<u8>,
}

/// One record of a duplicate-key chain.
///
/// Records are prepended, so the chain head is the newest value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNode {
    /// Records from this one to the end of the chain.
    pub copies: usize,
    /// Next (older) record, or [`Handle::NONE`].
    pub next: Handle,
    /// Payload bytes.
    pub value: Vec<u8>,
}

/// Content of an occupied pool slot.
#[derive(Debug, Clone)]
pub enum Node<K> {
    /// Branch node.
    Internal(InternalNode<K>),
    /// Leaf node.
    Leaf(LeafNode<K>),
    /// Single payload.
    Data(DataNode),
    /// Duplicate-chain record.
    Duplicate(DuplicateNode),
}

impl<K> Node<K> {
    /// Variant of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Internal(_) => NodeKind::Internal,
            Node::Leaf(_) => NodeKind::Leaf,
            Node::Data(_) => NodeKind::Data,
            Node::Duplicate(_) => NodeKind::Duplicate,
        }
    }

    /// Returns `true` for leaf nodes.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Entry count for tree nodes, `None` for payload records.
    pub fn entry_count(&self) -> Option<usize> {
        match self {
            Node::Internal(node) => Some(node.entries.len()),
            Node::Leaf(node) => Some(node.entries.len()),
            Node::Data(_) | Node::Duplicate(_) => None,
        }
    }

    /// Payload bytes of a data or duplicate record.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Node::Data(data) => Some(&data.value),
            Node::Duplicate(dup) => Some(&dup.value),
            Node::Internal(_) | Node::Leaf(_) => None,
        }
    }
}

/// Occupancy flags of a tree node, computed from its entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    /// Node variant.
    pub kind: NodeKind,
    /// Whether the node is the current root.
    pub is_root: bool,
    /// Entry count reached `fanout - 1`.
    pub is_full: bool,
    /// Entry count is `min_fanout - 1`; one more removal would underflow.
    pub is_at_minimum: bool,
    /// Number of entries.
    pub entries: usize,
}

/// Outcome of a binary search over sorted entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Key equals entry `i`.
    Exact(usize),
    /// Key sorts strictly between entry `i` and entry `i + 1`.
    Between(usize),
    /// Key sorts below every entry (or there are no entries).
    Lower,
    /// Key sorts above every entry.
    Upper,
}

/// Result of looking a key up in a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// Key was found at this index.
    Found(usize),
    /// Key was not found; this is where it would be inserted.
    NotFound(usize),
}

impl SearchResult {
    /// Returns the index, whether found or not.
    pub fn index(&self) -> usize {
        match self {
            SearchResult::Found(i) | SearchResult::NotFound(i) => *i,
        }
    }

    /// Returns true if the key was found.
    pub fn is_found(&self) -> bool {
        matches!(self, SearchResult::Found(_))
    }
}

/// Binary search for `key` in `entries`.
pub fn locate<K, C: KeyComparator<K>>(entries: &[Entry<K>], key: &K, cmp: &C) -> KeySlot {
    let count = entries.len();
    if count == 0 || cmp.compare(key, &entries[0].key) == Ordering::Less {
        return KeySlot::Lower;
    }
    if cmp.compare(key, &entries[count - 1].key) == Ordering::Greater {
        return KeySlot::Upper;
    }

    // entries[0] <= key <= entries[count - 1]
    let mut lo = 0;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp.compare(key, &entries[mid].key) {
            Ordering::Equal => return KeySlot::Exact(mid),
            Ordering::Less => hi = mid,
            Ordering::Greater => lo = mid + 1,
        }
    }
    KeySlot::Between(lo - 1)
}

/// Resolves a search slot to a child index of an internal node.
///
/// Equal keys route to the entry's own child, which holds keys >= it.
pub fn best_child(slot: KeySlot, count: usize) -> usize {
    match slot {
        KeySlot::Lower => 0,
        KeySlot::Exact(i) | KeySlot::Between(i) => i + 1,
        KeySlot::Upper => count,
    }
}

/// Resolves a search slot to an exact leaf entry or an insertion point.
pub fn best_entry(slot: KeySlot, count: usize) -> SearchResult {
    match slot {
        KeySlot::Exact(i) => SearchResult::Found(i),
        KeySlot::Between(i) => SearchResult::NotFound(i + 1),
        KeySlot::Lower => SearchResult::NotFound(0),
        KeySlot::Upper => SearchResult::NotFound(count),
    }
}

/// Typed slot access for tree nodes.
impl<K> NodePool<Node<K>> {
    fn kind_mismatch(&self, handle: Handle, expected: NodeKind) -> Error {
        match self.get(handle) {
            Ok(node) => Error::NodeKindMismatch { handle, expected, found: node.kind() },
            Err(err) => err,
        }
    }

    /// Returns the internal node at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds another variant.
    pub fn internal(&self, handle: Handle) -> Result<&InternalNode<K>> {
        match self.get(handle)? {
            Node::Internal(node) => Ok(node),
            _ => Err(self.kind_mismatch(handle, NodeKind::Internal)),
        }
    }

    /// Returns the internal node at `handle` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds another variant.
    pub fn internal_mut(&mut self, handle: Handle) -> Result<&mut InternalNode<K>> {
        let found = self.get(handle)?.kind();
        match self.get_mut(handle)? {
            Node::Internal(node) => Ok(node),
            _ => Err(Error::NodeKindMismatch { handle, expected: NodeKind::Internal, found }),
        }
    }

    /// Returns the leaf at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds another variant.
    pub fn leaf(&self, handle: Handle) -> Result<&LeafNode<K>> {
        match self.get(handle)? {
            Node::Leaf(node) => Ok(node),
            _ => Err(self.kind_mismatch(handle, NodeKind::Leaf)),
        }
    }

    /// Returns the leaf at `handle` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds another variant.
    pub fn leaf_mut(&mut self, handle: Handle) -> Result<&mut LeafNode<K>> {
        let found = self.get(handle)?.kind();
        match self.get_mut(handle)? {
            Node::Leaf(node) => Ok(node),
            _ => Err(Error::NodeKindMismatch { handle, expected: NodeKind::Leaf, found }),
        }
    }

    /// Borrows two distinct leaves mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if either slot is not a leaf.
    pub fn leaf_pair_mut(
        &mut self,
        a: Handle,
        b: Handle,
    ) -> Result<(&mut LeafNode<K>, &mut LeafNode<K>)> {
        let kinds = (self.get(a)?.kind(), self.get(b)?.kind());
        match self.pair_mut(a, b)? {
            (Node::Leaf(x), Node::Leaf(y)) => Ok((x, y)),
            (Node::Leaf(_), _) => {
                Err(Error::NodeKindMismatch { handle: b, expected: NodeKind::Leaf, found: kinds.1 })
            },
            _ => Err(Error::NodeKindMismatch { handle: a, expected: NodeKind::Leaf, found: kinds.0 }),
        }
    }

    /// Borrows two distinct internal nodes mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if either slot is not internal.
    pub fn internal_pair_mut(
        &mut self,
        a: Handle,
        b: Handle,
    ) -> Result<(&mut InternalNode<K>, &mut InternalNode<K>)> {
        let kinds = (self.get(a)?.kind(), self.get(b)?.kind());
        match self.pair_mut(a, b)? {
            (Node::Internal(x), Node::Internal(y)) => Ok((x, y)),
            (Node::Internal(_), _) => Err(Error::NodeKindMismatch {
                handle: b,
                expected: NodeKind::Internal,
                found: kinds.1,
            }),
            _ => Err(Error::NodeKindMismatch {
                handle: a,
                expected: NodeKind::Internal,
                found: kinds.0,
            }),
        }
    }

    /// Returns the payload bytes at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds a tree node.
    pub fn payload(&self, handle: Handle) -> Result<&[u8]> {
        let node = self.get(handle)?;
        node.value().ok_or(Error::NodeKindMismatch {
            handle,
            expected: NodeKind::Data,
            found: node.kind(),
        })
    }

    /// Entry count of the tree node at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if the slot holds a payload.
    pub fn entry_count(&self, handle: Handle) -> Result<usize> {
        let node = self.get(handle)?;
        node.entry_count().ok_or(Error::NodeKindMismatch {
            handle,
            expected: NodeKind::Leaf,
            found: node.kind(),
        })
    }
}
