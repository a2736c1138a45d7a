//! B+ tree over a fixed-capacity node pool.
//!
//! The tree keeps every node and payload record in one [`NodePool`] and
//! addresses them by [`Handle`]. All keys live in leaves; internal nodes
//! only route. Leaves are chained left to right for sequential scans.
//!
//! Both mutations run in a single top-down pass with no parent stack:
//!
//! - **Insert** splits any full node before entering it, so a split never
//!   has to propagate upward.
//! - **Delete** tops up any minimum-occupancy node before entering it, so a
//!   removal never underflows.
//!
//! ## Structure
//!
//! - `node.rs`: Node variants, key search and typed pool access
//! - `split.rs`: Leaf, internal and root splits for insertion
//! - `rebalance.rs`: Shifts, merges and root collapse for deletion
//! - `cursor.rs`: Leaf-chain scans and range queries

/// Leaf-chain scans and range queries.
pub mod cursor;
/// Node variants, key search and typed pool access.
pub mod node;
/// Shifts, merges and root collapse for deletion.
pub mod rebalance;
/// Leaf, internal and root splits for insertion.
pub mod split;

use cursor::{Bound, ListFrom, Range, RangeIter, Record, ScanCursor};
use node::{DataNode, DuplicateNode, Entry, LeafNode, Node, NodeStatus, SearchResult};
use rebalance::{Rebalance, collapse_root, rebalance_child};
use split::{split_child, split_root};
use tracing::{debug, warn};

use crate::{
    config::{DEFAULT_PAYLOAD_SIZE, TreeConfig},
    error::{Error, NodeKind, Result},
    pool::NodePool,
    types::{Handle, KeyComparator, NaturalOrder},
};

/// Counters of structural changes since the tree was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Node splits, root splits included.
    pub splits: u64,
    /// Root splits (height increases).
    pub root_splits: u64,
    /// Single-entry shifts between siblings.
    pub shifts: u64,
    /// Sibling merges.
    pub merges: u64,
    /// Root collapses (height decreases).
    pub collapses: u64,
}

/// Ordered index with duplicate-key support.
///
/// A fresh tree is a single empty leaf root of height 1. Values are opaque
/// byte payloads of at most [`TreeConfig::payload_size`] bytes; inserting
/// an existing key chains another value behind it instead of replacing it.
///
/// # Example
///
/// ```no_run
/// # use bptree::{NaturalOrder, Tree, TreeConfig};
/// let config = TreeConfig::builder().pool_capacity(1024).build().expect("valid config");
/// let mut tree: Tree<u32> = Tree::new(config, NaturalOrder).expect("tree");
/// tree.insert(7, b"seven").expect("insert");
/// assert_eq!(tree.get(&7).expect("get"), Some(&b"seven"[..]));
/// ```
#[derive(Debug, Clone)]
pub struct Tree<K, C = NaturalOrder> {
    pool: NodePool<Node<K>>,
    root: Handle,
    /// Leftmost leaf; merges keep the left node, so this never changes.
    first_leaf: Handle,
    height: usize,
    fanout: usize,
    min_fanout: usize,
    payload_size: usize,
    comparator: C,
    stats: TreeStats,
    key_count: usize,
    value_count: usize,
}

impl<K, C> Tree<K, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Creates an empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `config` fails validation.
    pub fn new(config: TreeConfig, comparator: C) -> Result<Self> {
        config.validate()?;
        let mut pool = NodePool::new(config.pool_capacity);
        let root = pool.allocate(Node::Leaf(LeafNode::new(config.fanout - 1)))?;
        Ok(Self {
            pool,
            root,
            first_leaf: root,
            height: 1,
            fanout: config.fanout,
            min_fanout: config.min_fanout(),
            payload_size: config.payload_size,
            comparator,
            stats: TreeStats::default(),
            key_count: 0,
            value_count: 0,
        })
    }

    /// Creates an empty tree with the default payload size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a capacity or fanout that
    /// [`TreeConfig::validate`] rejects.
    pub fn with_capacity(capacity: usize, fanout: usize, comparator: C) -> Result<Self> {
        let config =
            TreeConfig { pool_capacity: capacity, fanout, payload_size: DEFAULT_PAYLOAD_SIZE };
        Self::new(config, comparator)
    }

    fn max_entries(&self) -> usize {
        self.fanout - 1
    }

    fn min_entries(&self) -> usize {
        self.min_fanout - 1
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Follows resolved children from `start` down to a leaf.
    fn descend_to_leaf(&self, start: Handle, key: &K) -> Result<Handle> {
        let mut current = start;
        loop {
            match self.pool.get(current)? {
                Node::Leaf(_) => return Ok(current),
                Node::Internal(node) => {
                    current = node.child(node.child_index(key, &self.comparator));
                },
                other => {
                    return Err(Error::NodeKindMismatch {
                        handle: current,
                        expected: NodeKind::Internal,
                        found: other.kind(),
                    });
                },
            }
        }
    }

    /// Finds the leaf and entry index holding `key`.
    fn find_entry(&self, key: &K) -> Result<Option<(Handle, usize)>> {
        let leaf = self.descend_to_leaf(self.root, key)?;
        match self.pool.leaf(leaf)?.search(key, &self.comparator) {
            SearchResult::Found(index) => Ok(Some((leaf, index))),
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    /// Looks `key` up and returns the handle of its newest payload record.
    ///
    /// Never allocates or mutates; an empty tree yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn search(&self, key: &K) -> Result<Option<Handle>> {
        match self.find_entry(key)? {
            Some((leaf, index)) => Ok(Some(self.pool.leaf(leaf)?.entries[index].down)),
            None => Ok(None),
        }
    }

    /// Returns the newest value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn get(&self, key: &K) -> Result<Option<&[u8]>> {
        match self.search(key)? {
            Some(handle) => self.pool.payload(handle).map(Some),
            None => Ok(None),
        }
    }

    /// Returns every value stored under `key`, newest first.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn get_all(&self, key: &K) -> Result<Vec<&[u8]>> {
        let mut values = Vec::new();
        let Some(mut current) = self.search(key)? else {
            return Ok(values);
        };
        loop {
            match self.pool.get(current)? {
                Node::Data(data) => {
                    values.push(data.value.as_slice());
                    return Ok(values);
                },
                Node::Duplicate(dup) => {
                    values.push(dup.value.as_slice());
                    match dup.next.get() {
                        Some(next) => current = next,
                        None => return Ok(values),
                    }
                },
                other => {
                    return Err(Error::NodeKindMismatch {
                        handle: current,
                        expected: NodeKind::Duplicate,
                        found: other.kind(),
                    });
                },
            }
        }
    }

    /// Returns the bytes of the payload record at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for a free slot and
    /// [`Error::NodeKindMismatch`] if the slot holds a tree node.
    pub fn payload(&self, handle: Handle) -> Result<&[u8]> {
        self.pool.payload(handle)
    }

    /// Returns `true` if `key` has at least one value.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.search(key)?.is_some())
    }

    /// Number of values stored under `key` (0 if absent).
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn duplicate_count(&self, key: &K) -> Result<usize> {
        let Some(handle) = self.search(key)? else {
            return Ok(0);
        };
        match self.pool.get(handle)? {
            Node::Data(_) => Ok(1),
            Node::Duplicate(dup) => Ok(dup.copies),
            other => Err(Error::NodeKindMismatch {
                handle,
                expected: NodeKind::Data,
                found: other.kind(),
            }),
        }
    }

    /// Smallest key and its newest value.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn first(&self) -> Result<Option<Record<'_, K>>> {
        self.list_from(None, 1)?.next().transpose()
    }

    /// Largest key and its newest value.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn last(&self) -> Result<Option<Record<'_, K>>> {
        let mut current = self.root;
        let leaf = loop {
            match self.pool.get(current)? {
                Node::Leaf(leaf) => break leaf,
                Node::Internal(node) => current = node.child(node.entries.len()),
                other => {
                    return Err(Error::NodeKindMismatch {
                        handle: current,
                        expected: NodeKind::Internal,
                        found: other.kind(),
                    });
                },
            }
        };
        leaf.entries.last().map(|entry| Record::from_entry(&self.pool, entry)).transpose()
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Counts the pool slots an insert of `key` needs, without mutating.
    ///
    /// Every full node on the search path will be split: the root needs a
    /// sibling and a new root, any other node a sibling. The payload record
    /// needs one more slot.
    fn required_slots(&self, key: &K) -> Result<usize> {
        let max = self.max_entries();
        let mut required = 1;
        let mut current = self.root;
        if self.pool.entry_count(current)? >= max {
            required += 2;
        }
        while let Node::Internal(node) = self.pool.get(current)? {
            current = node.child(node.child_index(key, &self.comparator));
            if self.pool.entry_count(current)? >= max {
                required += 1;
            }
        }
        Ok(required)
    }

    /// Inserts a value under `key` and returns the new payload handle.
    ///
    /// An absent key gets a new entry. A present key keeps its entry and the
    /// value is chained in front of the existing ones.
    ///
    /// # Errors
    ///
    /// - [`Error::PayloadTooLarge`] if `data` exceeds the payload size
    /// - [`Error::PoolExhausted`] if the pool cannot hold the splits and the
    ///   payload this insert needs; the tree is unchanged in that case
    pub fn insert(&mut self, key: K, data: &[u8]) -> Result<Handle> {
        if data.len() > self.payload_size {
            return Err(Error::PayloadTooLarge { size: data.len(), max: self.payload_size });
        }

        let required = self.required_slots(&key)?;
        let free = self.pool.free_count();
        if free < required {
            warn!(
                required,
                free,
                capacity = self.pool.capacity(),
                "Insert refused: node pool exhausted"
            );
            return Err(Error::PoolExhausted { capacity: self.pool.capacity() });
        }

        let capacity = self.max_entries();
        if self.pool.entry_count(self.root)? >= capacity {
            let old_root = self.root;
            self.root = split_root(&mut self.pool, old_root, capacity)?;
            self.height += 1;
            self.stats.splits += 1;
            self.stats.root_splits += 1;
            debug!(old_root = %old_root, new_root = %self.root, height = self.height, "Split root");
        }

        let mut current = self.root;
        loop {
            let (index, child) = match self.pool.get(current)? {
                Node::Leaf(_) => break,
                Node::Internal(node) => {
                    let index = node.child_index(&key, &self.comparator);
                    (index, node.child(index))
                },
                other => {
                    return Err(Error::NodeKindMismatch {
                        handle: current,
                        expected: NodeKind::Internal,
                        found: other.kind(),
                    });
                },
            };

            if self.pool.entry_count(child)? >= capacity {
                split_child(&mut self.pool, current, index, capacity)?;
                self.stats.splits += 1;
                let node = self.pool.internal(current)?;
                current = node.child(node.child_index(&key, &self.comparator));
            } else {
                current = child;
            }
        }

        self.insert_into_leaf(current, key, data)
    }

    fn insert_into_leaf(&mut self, leaf: Handle, key: K, data: &[u8]) -> Result<Handle> {
        match self.pool.leaf(leaf)?.search(&key, &self.comparator) {
            SearchResult::NotFound(index) => {
                let payload = self.pool.allocate(Node::Data(DataNode { value: data.to_vec() }))?;
                self.pool.leaf_mut(leaf)?.entries.insert(index, Entry::new(key, payload));
                self.key_count += 1;
                self.value_count += 1;
                Ok(payload)
            },
            SearchResult::Found(index) => {
                let head = self.pool.leaf(leaf)?.entries[index].down;
                let copies = match self.pool.get(head)? {
                    Node::Data(_) => 1,
                    Node::Duplicate(dup) => dup.copies,
                    other => {
                        return Err(Error::NodeKindMismatch {
                            handle: head,
                            expected: NodeKind::Data,
                            found: other.kind(),
                        });
                    },
                };
                let record = self.pool.allocate(Node::Duplicate(DuplicateNode {
                    copies: copies + 1,
                    next: head,
                    value: data.to_vec(),
                }))?;

                // First duplicate: the lone payload becomes a one-record chain
                let slot = self.pool.get_mut(head)?;
                if let Node::Data(single) = &mut *slot {
                    let value = std::mem::take(&mut single.value);
                    *slot = Node::Duplicate(DuplicateNode { copies: 1, next: Handle::NONE, value });
                }

                self.pool.leaf_mut(leaf)?.entries[index].down = record;
                self.value_count += 1;
                Ok(record)
            },
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Removes the newest value stored under `key`.
    ///
    /// The entry itself goes away with its last value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent; the tree is
    /// unchanged in that case.
    pub fn delete(&mut self, key: &K) -> Result<()> {
        let Some((leaf, index)) = self.find_entry(key)? else {
            return Err(Error::KeyNotFound);
        };

        let head = self.pool.leaf(leaf)?.entries[index].down;
        if let Node::Duplicate(dup) = self.pool.get(head)?
            && dup.copies > 1
        {
            let next = dup.next;
            self.pool.release(head)?;
            self.pool.leaf_mut(leaf)?.entries[index].down = next;
            self.value_count -= 1;
            return Ok(());
        }

        let min_entries = self.min_entries();
        let mut current = self.root;
        loop {
            let index = match self.pool.get(current)? {
                Node::Leaf(_) => break,
                Node::Internal(node) => node.child_index(key, &self.comparator),
                other => {
                    return Err(Error::NodeKindMismatch {
                        handle: current,
                        expected: NodeKind::Internal,
                        found: other.kind(),
                    });
                },
            };

            match rebalance_child(&mut self.pool, current, index, min_entries)? {
                Some(Rebalance::Shift(_)) => self.stats.shifts += 1,
                Some(Rebalance::Merge(_)) => {
                    self.stats.merges += 1;
                    if current == self.root
                        && let Some(new_root) = collapse_root(&mut self.pool, current)?
                    {
                        self.root = new_root;
                        self.height -= 1;
                        self.stats.collapses += 1;
                        current = new_root;
                        continue;
                    }
                },
                None => {},
            }

            let node = self.pool.internal(current)?;
            current = node.child(node.child_index(key, &self.comparator));
        }

        let leaf = self.pool.leaf_mut(current)?;
        let SearchResult::Found(index) = leaf.search(key, &self.comparator) else {
            return Err(Error::Corrupted {
                handle: current,
                reason: "key vanished during rebalance".to_string(),
            });
        };
        let entry = leaf.entries.remove(index);
        self.release_chain(entry.down)?;
        self.key_count -= 1;
        self.value_count -= 1;
        Ok(())
    }

    fn release_chain(&mut self, head: Handle) -> Result<()> {
        let mut current = head.get();
        while let Some(handle) = current {
            current = match self.pool.release(handle)? {
                Node::Duplicate(dup) => dup.next.get(),
                _ => None,
            };
        }
        Ok(())
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Position of the first key `>= key` (or `> key` when `exclusive`).
    fn seek(&self, key: &K, exclusive: bool) -> Result<ScanCursor> {
        let leaf = self.descend_to_leaf(self.root, key)?;
        let slot = match self.pool.leaf(leaf)?.search(key, &self.comparator) {
            SearchResult::Found(index) if exclusive => index + 1,
            result => result.index(),
        };
        Ok(ScanCursor { leaf, slot })
    }

    /// Scans at most `count` keys in ascending order, starting at the first
    /// key `>= start` (or at the smallest key when `start` is `None`).
    ///
    /// A start past the largest key yields an empty scan.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn list_from(&self, start: Option<&K>, count: usize) -> Result<ListFrom<'_, K>> {
        let position = match start {
            Some(key) => self.seek(key, false)?,
            None => ScanCursor { leaf: self.first_leaf, slot: 0 },
        };
        Ok(ListFrom::new(&self.pool, Some(position), count))
    }

    /// Continues a scan from a cursor returned by [`ListFrom::cursor`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] or [`Error::NodeKindMismatch`] if the
    /// cursor's leaf was released or reused since the cursor was taken.
    pub fn resume(&self, cursor: ScanCursor, count: usize) -> Result<ListFrom<'_, K>> {
        self.pool.leaf(cursor.leaf)?;
        Ok(ListFrom::new(&self.pool, Some(cursor), count))
    }

    /// Scans every key in ascending order.
    pub fn iter(&self) -> ListFrom<'_, K> {
        ListFrom::new(&self.pool, Some(ScanCursor { leaf: self.first_leaf, slot: 0 }), usize::MAX)
    }

    /// Scans the keys inside `range` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns node access errors only if the tree is corrupt.
    pub fn range<'a>(&'a self, range: Range<'a, K>) -> Result<RangeIter<'a, K, C>> {
        let position = match range.start {
            Bound::Unbounded => ScanCursor { leaf: self.first_leaf, slot: 0 },
            Bound::Included(key) => self.seek(key, false)?,
            Bound::Excluded(key) => self.seek(key, true)?,
        };
        let inner = ListFrom::new(&self.pool, Some(position), usize::MAX);
        Ok(RangeIter::new(inner, range, &self.comparator))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Occupancy flags of the tree node at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeKindMismatch`] if `handle` holds a payload.
    pub fn node_status(&self, handle: Handle) -> Result<NodeStatus> {
        let kind = self.pool.get(handle)?.kind();
        let entries = self.pool.entry_count(handle)?;
        Ok(NodeStatus {
            kind,
            is_root: handle == self.root,
            is_full: entries >= self.max_entries(),
            is_at_minimum: entries <= self.min_entries(),
            entries,
        })
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.key_count
    }

    /// Number of stored values, duplicates included.
    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Returns `true` if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    /// Number of levels; a lone leaf root has height 1.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Maximum children per internal node.
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Minimum children per non-root internal node, `ceil(fanout / 2)`.
    pub fn min_fanout(&self) -> usize {
        self.min_fanout
    }

    /// Maximum payload length in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Current root node.
    pub fn root(&self) -> Handle {
        self.root
    }

    /// Leftmost leaf, where full scans start.
    pub fn first_leaf(&self) -> Handle {
        self.first_leaf
    }

    /// Free pool slots.
    pub fn free_count(&self) -> usize {
        self.pool.free_count()
    }

    /// Total pool slots.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Structural change counters.
    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    /// The key comparator.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub(crate) fn pool(&self) -> &NodePool<Node<K>> {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn pool_mut(&mut self) -> &mut NodePool<Node<K>> {
        &mut self.pool
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// Capacity 16, fanout 4: the small tree used by the worked example.
    fn small_tree() -> Tree<u32> {
        Tree::with_capacity(16, 4, NaturalOrder).expect("valid config")
    }

    fn tree_with(capacity: usize, fanout: usize) -> Tree<u32> {
        Tree::with_capacity(capacity, fanout, NaturalOrder).expect("valid config")
    }

    fn keys(tree: &Tree<u32>) -> Vec<u32> {
        tree.iter().map(|r| *r.unwrap().key).collect()
    }

    fn leaf_keys(tree: &Tree<u32>) -> Vec<Vec<u32>> {
        let mut leaves = Vec::new();
        let mut current = tree.first_leaf().get();
        while let Some(handle) = current {
            let leaf = tree.pool().leaf(handle).unwrap();
            leaves.push(leaf.entries.iter().map(|e| e.key).collect());
            current = leaf.next_leaf.get();
        }
        leaves
    }

    // ===
    // Construction
    // ===

    #[test]
    fn test_new_tree_is_single_empty_leaf() {
        let tree = small_tree();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root(), tree.first_leaf());
        assert!(tree.is_empty());
        assert_eq!(tree.free_count(), 15);
        assert_eq!(tree.min_fanout(), 2);

        let status = tree.node_status(tree.root()).unwrap();
        assert!(status.is_root);
        assert_eq!(status.kind, NodeKind::Leaf);
        assert_eq!(status.entries, 0);
    }

    #[test]
    fn test_invalid_fanout_rejected() {
        let err = Tree::<u32>::with_capacity(16, 3, NaturalOrder).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let err = Tree::<u32>::with_capacity(3, 4, NaturalOrder).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    // ===
    // Search
    // ===

    #[test]
    fn test_search_empty_tree_does_not_mutate() {
        let tree = small_tree();
        let before = tree.free_count();
        assert_eq!(tree.search(&42).unwrap(), None);
        assert_eq!(tree.get(&42).unwrap(), None);
        assert_eq!(tree.free_count(), before);
        assert_eq!(tree.stats(), TreeStats::default());
    }

    #[test]
    fn test_insert_then_search() {
        let mut tree = small_tree();
        let handle = tree.insert(5, b"five").unwrap();
        assert_eq!(tree.search(&5).unwrap(), Some(handle));
        assert_eq!(tree.payload(handle).unwrap(), b"five");
        assert!(tree.contains_key(&5).unwrap());
        assert!(!tree.contains_key(&6).unwrap());
    }

    // ===
    // Worked example
    // ===

    #[test]
    fn test_worked_example_insert() {
        let mut tree = small_tree();
        for key in [10, 20, 5, 15, 25, 1] {
            tree.insert(key, &key.to_le_bytes()).unwrap();
        }

        assert_eq!(tree.height(), 2);
        assert_eq!(leaf_keys(&tree), vec![vec![1, 5, 10], vec![15], vec![20, 25]]);
        assert_eq!(keys(&tree), vec![1, 5, 10, 15, 20, 25]);
        assert_eq!(tree.stats().root_splits, 1);
        assert_eq!(tree.stats().splits, 2);
        // 4 tree nodes + 6 payloads
        assert_eq!(tree.free_count(), 6);
    }

    #[test]
    fn test_worked_example_delete() {
        let mut tree = small_tree();
        for key in [10, 20, 5, 15, 25, 1] {
            tree.insert(key, &key.to_le_bytes()).unwrap();
        }

        tree.delete(&10).unwrap();
        tree.delete(&20).unwrap();

        assert_eq!(leaf_keys(&tree), vec![vec![1, 5], vec![15], vec![25]]);
        assert_eq!(tree.search(&10).unwrap(), None);
        assert_eq!(tree.search(&20).unwrap(), None);
        assert_eq!(tree.free_count(), 8);
    }

    // ===
    // Insert
    // ===

    #[test]
    fn test_payload_too_large() {
        let mut tree = small_tree();
        let err = tree.insert(1, &[0u8; 17]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { size: 17, max: 16 }));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_duplicates_chain_newest_first() {
        let mut tree = small_tree();
        let first = tree.insert(7, b"a").unwrap();
        tree.insert(7, b"b").unwrap();
        let newest = tree.insert(7, b"c").unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.value_count(), 3);
        assert_eq!(tree.duplicate_count(&7).unwrap(), 3);
        assert_eq!(tree.search(&7).unwrap(), Some(newest));
        assert_eq!(tree.get_all(&7).unwrap(), vec![&b"c"[..], &b"b"[..], &b"a"[..]]);

        // The original payload became the chain tail in place
        match tree.pool().get(first).unwrap() {
            Node::Duplicate(dup) => {
                assert_eq!(dup.copies, 1);
                assert!(dup.next.is_none());
            },
            other => panic!("expected duplicate record, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_pool_exhaustion_leaves_tree_unchanged() {
        // fanout 4, 8 slots: root leaf + payloads fill up quickly
        let mut tree = tree_with(8, 4);
        let mut inserted = Vec::new();
        let err = loop {
            let key = inserted.len() as u32;
            match tree.insert(key, b"v") {
                Ok(_) => inserted.push(key),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, Error::PoolExhausted { capacity: 8 }));

        let snapshot = keys(&tree);
        let free = tree.free_count();
        let height = tree.height();

        let again = tree.insert(999, b"v").unwrap_err();
        assert!(matches!(again, Error::PoolExhausted { .. }));
        assert_eq!(keys(&tree), snapshot);
        assert_eq!(tree.free_count(), free);
        assert_eq!(tree.height(), height);
        assert_eq!(snapshot, inserted);
    }

    #[test]
    fn test_first_and_last() {
        let mut tree = tree_with(128, 4);
        assert!(tree.first().unwrap().is_none());
        assert!(tree.last().unwrap().is_none());

        for key in [40, 10, 30, 20, 50, 60, 70] {
            tree.insert(key, b"x").unwrap();
        }
        assert_eq!(*tree.first().unwrap().unwrap().key, 10);
        assert_eq!(*tree.last().unwrap().unwrap().key, 70);
    }

    // ===
    // Delete
    // ===

    #[test]
    fn test_delete_missing_key() {
        let mut tree = small_tree();
        assert!(matches!(tree.delete(&1), Err(Error::KeyNotFound)));

        tree.insert(1, b"one").unwrap();
        let free = tree.free_count();
        assert!(matches!(tree.delete(&2), Err(Error::KeyNotFound)));
        assert_eq!(tree.free_count(), free);
        assert_eq!(keys(&tree), vec![1]);
    }

    #[test]
    fn test_duplicate_delete_unwinds_chain() {
        let mut tree = small_tree();
        for value in [b"a", b"b", b"c"] {
            tree.insert(3, value).unwrap();
        }

        tree.delete(&3).unwrap();
        assert_eq!(tree.get(&3).unwrap(), Some(&b"b"[..]));
        tree.delete(&3).unwrap();
        assert_eq!(tree.get_all(&3).unwrap(), vec![&b"a"[..]]);
        tree.delete(&3).unwrap();
        assert_eq!(tree.search(&3).unwrap(), None);
        assert_eq!(tree.free_count(), 15);
    }

    #[test]
    fn test_delete_all_returns_to_single_leaf() {
        let mut tree = tree_with(256, 4);
        let initial_free = tree.free_count();
        let keys_in: Vec<u32> = (0..60).map(|i| (i * 37) % 61).collect();

        for key in &keys_in {
            tree.insert(*key, b"v").unwrap();
        }
        assert!(tree.height() > 2);

        for key in &keys_in {
            tree.delete(key).unwrap();
        }

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root(), tree.first_leaf());
        assert_eq!(tree.free_count(), initial_free);
        assert!(tree.is_empty());
        assert!(tree.stats().collapses > 0);
        assert!(tree.stats().merges > 0);
    }

    #[test]
    fn test_first_leaf_is_stable() {
        let mut tree = tree_with(256, 4);
        let first = tree.first_leaf();
        for key in 0..50u32 {
            tree.insert(key, b"v").unwrap();
        }
        for key in 0..45u32 {
            tree.delete(&key).unwrap();
        }
        assert_eq!(tree.first_leaf(), first);
        assert_eq!(keys(&tree), vec![45, 46, 47, 48, 49]);
    }

    // ===
    // Scans
    // ===

    #[test]
    fn test_list_from_start_key_and_count() {
        let mut tree = tree_with(128, 4);
        for key in (0..40u32).map(|k| k * 2) {
            tree.insert(key, b"v").unwrap();
        }

        let got: Vec<u32> = tree.list_from(Some(&11), 3).unwrap().map(|r| *r.unwrap().key).collect();
        assert_eq!(got, vec![12, 14, 16]);

        let got: Vec<u32> = tree.list_from(Some(&12), 2).unwrap().map(|r| *r.unwrap().key).collect();
        assert_eq!(got, vec![12, 14]);

        assert_eq!(tree.list_from(Some(&1000), 5).unwrap().count(), 0);
        assert_eq!(tree.list_from(None, 0).unwrap().count(), 0);
    }

    #[test]
    fn test_resume_continues_scan() {
        let mut tree = tree_with(128, 4);
        for key in 0..30u32 {
            tree.insert(key, b"v").unwrap();
        }

        let mut scan = tree.list_from(None, 10).unwrap();
        let first: Vec<u32> = scan.by_ref().map(|r| *r.unwrap().key).collect();
        let cursor = scan.cursor().unwrap();
        let rest: Vec<u32> = tree.resume(cursor, 100).unwrap().map(|r| *r.unwrap().key).collect();

        assert_eq!(first, (0..10).collect::<Vec<_>>());
        assert_eq!(rest, (10..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_resume_stale_cursor() {
        let tree = small_tree();
        let cursor = ScanCursor { leaf: Handle::new(9), slot: 0 };
        assert!(matches!(tree.resume(cursor, 1), Err(Error::InvalidHandle { .. })));
    }

    #[test]
    fn test_range_bounds() {
        let mut tree = tree_with(128, 4);
        for key in 0..20u32 {
            tree.insert(key, b"v").unwrap();
        }
        let (five, nine) = (5u32, 9u32);
        let collect = |range: Range<'_, u32>| -> Vec<u32> {
            tree.range(range).unwrap().map(|r| *r.unwrap().key).collect()
        };

        assert_eq!(collect(Range::new(&five, &nine)), vec![5, 6, 7, 8]);
        assert_eq!(collect(Range::inclusive(&five, &nine)), vec![5, 6, 7, 8, 9]);
        assert_eq!(
            collect(Range { start: Bound::Excluded(&five), end: Bound::Included(&nine) }),
            vec![6, 7, 8, 9]
        );
        assert_eq!(collect(Range::to(&five)), vec![0, 1, 2, 3, 4]);
        assert_eq!(collect(Range::all()).len(), 20);
    }

    #[test]
    fn test_custom_comparator_descending() {
        let descending = |a: &u32, b: &u32| b.cmp(a);
        let mut tree = Tree::with_capacity(128, 4, descending).unwrap();
        for key in 0..20u32 {
            tree.insert(key, b"v").unwrap();
        }
        let got: Vec<u32> = tree.iter().map(|r| *r.unwrap().key).collect();
        assert_eq!(got, (0..20).rev().collect::<Vec<_>>());
    }

    // ============================================
    // Property-based tree invariant tests
    // ============================================

    mod proptest_tree {
        use std::collections::BTreeMap;

        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(u16, u8),
            Delete(u16),
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => (0u16..200, any::<u8>()).prop_map(|(k, v)| Op::Insert(k, v)),
                2 => (0u16..200).prop_map(Op::Delete),
            ]
        }

        proptest! {
            /// Random operation sequences agree with a map-of-stacks model.
            #[test]
            fn prop_matches_model(
                fanout in prop::sample::select(vec![4usize, 6, 8]),
                ops in proptest::collection::vec(arb_op(), 1..400),
            ) {
                let mut tree: Tree<u16> = Tree::with_capacity(2048, fanout, NaturalOrder).unwrap();
                let mut model: BTreeMap<u16, Vec<u8>> = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Insert(k, v) => {
                            tree.insert(k, &[v]).unwrap();
                            model.entry(k).or_default().push(v);
                        },
                        Op::Delete(k) => {
                            let result = tree.delete(&k);
                            match model.get_mut(&k) {
                                Some(values) => {
                                    prop_assert!(result.is_ok());
                                    values.pop();
                                    if values.is_empty() {
                                        model.remove(&k);
                                    }
                                },
                                None => {
                                    prop_assert!(matches!(result, Err(Error::KeyNotFound)));
                                },
                            }
                        },
                    }
                }

                let scanned: Vec<(u16, usize, u8)> = tree
                    .iter()
                    .map(|r| {
                        let r = r.unwrap();
                        (*r.key, r.copies, r.value[0])
                    })
                    .collect();
                let expected: Vec<(u16, usize, u8)> = model
                    .iter()
                    .map(|(k, values)| (*k, values.len(), *values.last().unwrap()))
                    .collect();
                prop_assert_eq!(scanned, expected);
                prop_assert_eq!(tree.len(), model.len());
                prop_assert_eq!(
                    tree.value_count(),
                    model.values().map(Vec::len).sum::<usize>()
                );
            }

            /// Inserting then deleting every key restores the initial pool.
            #[test]
            fn prop_insert_delete_all_restores_pool(
                keys in proptest::collection::hash_set(any::<u32>(), 1..300),
            ) {
                let mut tree: Tree<u32> = Tree::with_capacity(1024, 4, NaturalOrder).unwrap();
                let initial_free = tree.free_count();

                for key in &keys {
                    tree.insert(*key, b"v").unwrap();
                }
                for key in &keys {
                    tree.delete(key).unwrap();
                }

                prop_assert_eq!(tree.height(), 1);
                prop_assert_eq!(tree.free_count(), initial_free);
                prop_assert!(tree.iter().next().is_none());
            }
        }
    }
}
