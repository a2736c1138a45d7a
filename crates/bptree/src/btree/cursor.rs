//! Leaf-chain scans and range queries.
//!
//! Scans walk the leaf chain from a starting position and never touch
//! internal nodes after the initial descent. A [`ListFrom`] yields at most
//! `count` records and can be suspended: [`ListFrom::cursor`] returns a
//! [`ScanCursor`] that [`Tree::resume`] picks up from later. A cursor is a
//! plain position; a mutation in between may leave it pointing at a
//! released or reused slot, which the resumed scan reports as an error
//! rather than following.
//!
//! [`Tree::resume`]: crate::Tree::resume

use std::cmp::Ordering;

use super::node::{Entry, Node};
use crate::{
    error::{Error, NodeKind, Result},
    pool::NodePool,
    types::{Handle, KeyComparator},
};

/// Position inside the leaf chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    /// Leaf holding the next entry.
    pub leaf: Handle,
    /// Entry index within that leaf. May equal the leaf's entry count, in
    /// which case the scan continues with the next leaf.
    pub slot: usize,
}

/// One key as seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a, K> {
    /// The key.
    pub key: &'a K,
    /// Handle of the newest payload record for the key.
    pub handle: Handle,
    /// Number of values stored under the key.
    pub copies: usize,
    /// Newest payload bytes.
    pub value: &'a [u8],
}

impl<'a, K> Record<'a, K> {
    pub(crate) fn from_entry(pool: &'a NodePool<Node<K>>, entry: &'a Entry<K>) -> Result<Self> {
        let (copies, value) = match pool.get(entry.down)? {
            Node::Data(data) => (1, data.value.as_slice()),
            Node::Duplicate(dup) => (dup.copies, dup.value.as_slice()),
            other => {
                return Err(Error::NodeKindMismatch {
                    handle: entry.down,
                    expected: NodeKind::Data,
                    found: other.kind(),
                });
            },
        };
        Ok(Self { key: &entry.key, handle: entry.down, copies, value })
    }
}

/// Lazy, finite scan over the leaf chain.
///
/// Created by [`Tree::list_from`] and [`Tree::resume`].
///
/// [`Tree::list_from`]: crate::Tree::list_from
/// [`Tree::resume`]: crate::Tree::resume
#[derive(Debug, Clone)]
pub struct ListFrom<'a, K> {
    pool: &'a NodePool<Node<K>>,
    position: Option<ScanCursor>,
    remaining: usize,
}

impl<'a, K> ListFrom<'a, K> {
    pub(crate) fn new(
        pool: &'a NodePool<Node<K>>,
        position: Option<ScanCursor>,
        count: usize,
    ) -> Self {
        Self { pool, position, remaining: count }
    }

    /// Position of the next record, or `None` once the chain is exhausted.
    ///
    /// After the record budget runs out this still returns where the scan
    /// stopped, so it can be resumed.
    pub fn cursor(&self) -> Option<ScanCursor> {
        self.position
    }

    /// Records this scan may still yield.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<'a, K> Iterator for ListFrom<'a, K> {
    type Item = Result<Record<'a, K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            let cursor = self.position?;
            let leaf = match self.pool.leaf(cursor.leaf) {
                Ok(leaf) => leaf,
                Err(err) => {
                    self.position = None;
                    return Some(Err(err));
                },
            };

            let Some(entry) = leaf.entries.get(cursor.slot) else {
                self.position = leaf.next_leaf.get().map(|leaf| ScanCursor { leaf, slot: 0 });
                continue;
            };

            self.position = Some(ScanCursor { leaf: cursor.leaf, slot: cursor.slot + 1 });
            self.remaining -= 1;
            let record = Record::from_entry(self.pool, entry);
            if record.is_err() {
                self.position = None;
            }
            return Some(record);
        }
    }
}

/// Range bound specification.
#[derive(Debug, Clone, Copy)]
pub enum Bound<'a, K> {
    /// No bound (unbounded).
    Unbounded,
    /// Inclusive bound.
    Included(&'a K),
    /// Exclusive bound.
    Excluded(&'a K),
}

/// A range query specification.
#[derive(Debug, Clone, Copy)]
pub struct Range<'a, K> {
    /// Lower bound.
    pub start: Bound<'a, K>,
    /// Upper bound.
    pub end: Bound<'a, K>,
}

impl<'a, K> Range<'a, K> {
    /// Creates a range covering all keys.
    pub fn all() -> Self {
        Self { start: Bound::Unbounded, end: Bound::Unbounded }
    }

    /// Creates a range from start (inclusive) to end (exclusive).
    pub fn new(start: &'a K, end: &'a K) -> Self {
        Self { start: Bound::Included(start), end: Bound::Excluded(end) }
    }

    /// Creates a range from start to end, both inclusive.
    pub fn inclusive(start: &'a K, end: &'a K) -> Self {
        Self { start: Bound::Included(start), end: Bound::Included(end) }
    }

    /// Creates a range starting from a key (inclusive).
    pub fn from(start: &'a K) -> Self {
        Self { start: Bound::Included(start), end: Bound::Unbounded }
    }

    /// Creates a range of all keys below `end` (exclusive).
    pub fn to(end: &'a K) -> Self {
        Self { start: Bound::Unbounded, end: Bound::Excluded(end) }
    }

    /// Checks if a key is within this range.
    pub fn contains<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> bool {
        let after_start = match self.start {
            Bound::Unbounded => true,
            Bound::Included(start) => cmp.compare(key, start) != Ordering::Less,
            Bound::Excluded(start) => cmp.compare(key, start) == Ordering::Greater,
        };
        after_start && self.should_continue(key, cmp)
    }

    /// Checks if iteration should continue based on current key.
    pub fn should_continue<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> bool {
        match self.end {
            Bound::Unbounded => true,
            Bound::Included(end) => cmp.compare(key, end) != Ordering::Greater,
            Bound::Excluded(end) => cmp.compare(key, end) == Ordering::Less,
        }
    }
}

/// Scan limited to a key range.
///
/// Created by [`Tree::range`](crate::Tree::range).
#[derive(Debug)]
pub struct RangeIter<'a, K, C> {
    inner: ListFrom<'a, K>,
    range: Range<'a, K>,
    cmp: &'a C,
    done: bool,
}

impl<'a, K, C> RangeIter<'a, K, C> {
    pub(crate) fn new(inner: ListFrom<'a, K>, range: Range<'a, K>, cmp: &'a C) -> Self {
        Self { inner, range, cmp, done: false }
    }
}

impl<'a, K, C: KeyComparator<K>> Iterator for RangeIter<'a, K, C> {
    type Item = Result<Record<'a, K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Ok(record) if self.range.should_continue(record.key, self.cmp) => Some(Ok(record)),
            Ok(_) => {
                self.done = true;
                None
            },
            Err(err) => {
                self.done = true;
                Some(Err(err))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        btree::node::{DataNode, DuplicateNode, LeafNode},
        types::NaturalOrder,
    };

    #[test]
    fn test_range_contains() {
        let (lo, hi) = (10u32, 20u32);
        let range = Range::new(&lo, &hi);

        assert!(!range.contains(&9, &NaturalOrder));
        assert!(range.contains(&10, &NaturalOrder));
        assert!(range.contains(&15, &NaturalOrder));
        assert!(!range.contains(&20, &NaturalOrder)); // Exclusive end
        assert!(!range.contains(&99, &NaturalOrder));
    }

    #[test]
    fn test_range_inclusive_and_excluded_start() {
        let (lo, hi) = (10u32, 20u32);
        let range = Range::inclusive(&lo, &hi);
        assert!(range.contains(&20, &NaturalOrder));

        let range = Range { start: Bound::Excluded(&lo), end: Bound::Unbounded };
        assert!(!range.contains(&10, &NaturalOrder));
        assert!(range.contains(&11, &NaturalOrder));
    }

    #[test]
    fn test_range_all() {
        let range: Range<'_, u32> = Range::all();
        assert!(range.contains(&0, &NaturalOrder));
        assert!(range.contains(&u32::MAX, &NaturalOrder));
    }

    /// Two chained leaves: [1, 2] -> [3] with a duplicate chain under 2.
    fn chained_pool() -> (NodePool<Node<u32>>, Handle) {
        let mut pool = NodePool::new(8);
        let d1 = pool.allocate(Node::Data(DataNode { value: b"one".to_vec() })).unwrap();
        let tail = pool
            .allocate(Node::Duplicate(DuplicateNode {
                copies: 1,
                next: Handle::NONE,
                value: b"two-a".to_vec(),
            }))
            .unwrap();
        let d2 = pool
            .allocate(Node::Duplicate(DuplicateNode { copies: 2, next: tail, value: b"two-b".to_vec() }))
            .unwrap();
        let d3 = pool.allocate(Node::Data(DataNode { value: b"three".to_vec() })).unwrap();

        let mut second = LeafNode::new(3);
        second.entries.push(Entry::new(3, d3));
        let second = pool.allocate(Node::Leaf(second)).unwrap();

        let mut first = LeafNode::new(3);
        first.entries.push(Entry::new(1, d1));
        first.entries.push(Entry::new(2, d2));
        first.next_leaf = second;
        let first = pool.allocate(Node::Leaf(first)).unwrap();
        (pool, first)
    }

    #[test]
    fn test_list_from_walks_leaf_chain() {
        let (pool, first) = chained_pool();
        let scan = ListFrom::new(&pool, Some(ScanCursor { leaf: first, slot: 0 }), usize::MAX);

        let records: Vec<_> = scan.map(|r| r.unwrap()).collect();
        let keys: Vec<u32> = records.iter().map(|r| *r.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(records[1].copies, 2);
        assert_eq!(records[1].value, b"two-b");
        assert_eq!(records[2].value, b"three");
    }

    #[test]
    fn test_list_from_respects_count_and_resumes() {
        let (pool, first) = chained_pool();
        let mut scan = ListFrom::new(&pool, Some(ScanCursor { leaf: first, slot: 0 }), 2);

        assert_eq!(*scan.next().unwrap().unwrap().key, 1);
        assert_eq!(*scan.next().unwrap().unwrap().key, 2);
        assert!(scan.next().is_none());
        assert_eq!(scan.remaining(), 0);

        let cursor = scan.cursor().unwrap();
        assert_eq!(cursor, ScanCursor { leaf: first, slot: 2 });

        let rest: Vec<u32> =
            ListFrom::new(&pool, Some(cursor), 10).map(|r| *r.unwrap().key).collect();
        assert_eq!(rest, vec![3]);
    }

    #[test]
    fn test_list_from_stale_cursor_errors() {
        let (pool, _) = chained_pool();
        let mut scan = ListFrom::new(&pool, Some(ScanCursor { leaf: Handle::new(0), slot: 0 }), 5);

        let err = scan.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::NodeKindMismatch { expected: NodeKind::Leaf, .. }));
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_range_iter_stops_at_end_bound() {
        let (pool, first) = chained_pool();
        let end = 3u32;
        let inner = ListFrom::new(&pool, Some(ScanCursor { leaf: first, slot: 0 }), usize::MAX);
        let keys: Vec<u32> = RangeIter::new(inner, Range::to(&end), &NaturalOrder)
            .map(|r| *r.unwrap().key)
            .collect();
        assert_eq!(keys, vec![1, 2]);
    }
}
