//! Integrity scrubber for detecting structural corruption.
//!
//! Walks the whole tree from the root and checks every invariant the
//! insert and delete paths are supposed to maintain. Violations are
//! collected into a [`ScrubResult`] instead of panicking, so the scrubber
//! can run against a tree that is already damaged.

use std::{cmp::Ordering, collections::HashSet};

use crate::{
    btree::{Tree, node::Node},
    types::{Handle, KeyComparator},
};

/// Result of an integrity scrub.
#[derive(Debug, Clone, Default)]
pub struct ScrubResult {
    /// Number of pool slots visited (tree nodes and payload records).
    pub nodes_checked: u64,
    /// Number of structural errors detected.
    pub structural_errors: u64,
    /// Detailed error descriptions.
    pub errors: Vec<ScrubError>,
}

impl ScrubResult {
    /// Returns `true` if no error was found.
    pub fn is_clean(&self) -> bool {
        self.structural_errors == 0
    }

    fn report(&mut self, handle: Handle, description: String) {
        self.structural_errors += 1;
        self.errors.push(ScrubError { handle, description });
    }
}

/// A single integrity error detected during scrubbing.
#[derive(Debug, Clone)]
pub struct ScrubError {
    /// The slot where the error was detected.
    pub handle: Handle,
    /// Human-readable description of the error.
    pub description: String,
}

/// Key interval a subtree must stay within: `[lower, upper)`.
struct KeyBounds<'k, K> {
    lower: Option<&'k K>,
    upper: Option<&'k K>,
}

/// Structural verifier for a [`Tree`].
///
/// Checks:
/// - Occupancy bounds on every node (root exempt from the minimum)
/// - Strictly ascending keys within each node
/// - Every key inside the interval its parent separators allow
/// - All leaves at depth equal to the tree height
/// - Leaf chain equal to the in-order leaf sequence, starting at the first leaf
/// - Payload variants, payload sizes and duplicate-chain counts
/// - No slot reachable twice, and reachable plus free slots equal to capacity
/// - Key and value counters matching the stored entries
pub struct IntegrityScrubber<'a, K, C> {
    tree: &'a Tree<K, C>,
}

#[derive(Default)]
struct Walk {
    visited: HashSet<Handle>,
    leaves: Vec<Handle>,
    keys: usize,
    values: usize,
}

impl<'a, K, C> IntegrityScrubber<'a, K, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Creates a scrubber for the given tree.
    pub fn new(tree: &'a Tree<K, C>) -> Self {
        Self { tree }
    }

    /// Runs every check and returns the collected result.
    pub fn verify(&self) -> ScrubResult {
        let mut result = ScrubResult::default();
        let mut walk = Walk::default();

        let bounds = KeyBounds { lower: None, upper: None };
        self.verify_subtree(self.tree.root(), 1, bounds, &mut walk, &mut result);
        self.verify_leaf_chain(&walk, &mut result);
        self.verify_accounting(&walk, &mut result);

        result
    }

    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.tree.comparator().compare(a, b)
    }

    fn verify_subtree(
        &self,
        handle: Handle,
        depth: usize,
        bounds: KeyBounds<'a, K>,
        walk: &mut Walk,
        result: &mut ScrubResult,
    ) {
        if !walk.visited.insert(handle) {
            result.report(handle, format!("Node {handle} reachable more than once"));
            return;
        }
        result.nodes_checked += 1;

        let node = match self.tree.pool().get(handle) {
            Ok(node) => node,
            Err(e) => {
                result.report(handle, format!("Cannot read node {handle}: {e}"));
                return;
            },
        };

        let entries = match node {
            Node::Internal(internal) => &internal.entries,
            Node::Leaf(leaf) => &leaf.entries,
            other => {
                result.report(
                    handle,
                    format!("Payload record {:?} found in tree position at {handle}", other.kind()),
                );
                return;
            },
        };

        self.verify_occupancy(handle, node, entries.len(), result);

        for i in 1..entries.len() {
            if self.compare(&entries[i - 1].key, &entries[i].key) != Ordering::Less {
                result.report(
                    handle,
                    format!("Key ordering violation in node {handle}: key[{}] >= key[{i}]", i - 1),
                );
                break;
            }
        }

        for (i, entry) in entries.iter().enumerate() {
            let below_lower =
                bounds.lower.is_some_and(|lower| self.compare(&entry.key, lower) == Ordering::Less);
            let above_upper =
                bounds.upper.is_some_and(|upper| self.compare(&entry.key, upper) != Ordering::Less);
            if below_lower || above_upper {
                result.report(
                    handle,
                    format!("Key {i} of node {handle} lies outside its parent separators"),
                );
                break;
            }
        }

        match node {
            Node::Internal(internal) => {
                if depth >= self.tree.height() {
                    result.report(
                        handle,
                        format!("Internal node {handle} at depth {depth} reaches leaf level"),
                    );
                    return;
                }
                let keys = &internal.entries;
                for index in 0..internal.child_count() {
                    let child_bounds = KeyBounds {
                        lower: if index == 0 { bounds.lower } else { Some(&keys[index - 1].key) },
                        upper: keys.get(index).map(|e| &e.key).or(bounds.upper),
                    };
                    self.verify_subtree(internal.child(index), depth + 1, child_bounds, walk, result);
                }
            },
            Node::Leaf(leaf) => {
                if depth != self.tree.height() {
                    result.report(
                        handle,
                        format!(
                            "Leaf {handle} at depth {depth}, expected {}",
                            self.tree.height()
                        ),
                    );
                }
                walk.leaves.push(handle);
                walk.keys += leaf.entries.len();
                for entry in &leaf.entries {
                    self.verify_payload(entry.down, walk, result);
                }
            },
            Node::Data(_) | Node::Duplicate(_) => {},
        }
    }

    fn verify_occupancy(
        &self,
        handle: Handle,
        node: &Node<K>,
        entries: usize,
        result: &mut ScrubResult,
    ) {
        let max = self.tree.fanout() - 1;
        let min = self.tree.min_fanout() - 1;
        let is_root = handle == self.tree.root();

        if entries > max {
            result.report(handle, format!("Node {handle} holds {entries} entries, max {max}"));
        }
        if !is_root && entries < min {
            result.report(handle, format!("Node {handle} holds {entries} entries, min {min}"));
        }
        if is_root && matches!(node, Node::Internal(_)) && entries == 0 {
            result.report(handle, format!("Internal root {handle} has no entries"));
        }
    }

    /// Walks a duplicate chain (or single payload) starting at `head`.
    fn verify_payload(&self, head: Handle, walk: &mut Walk, result: &mut ScrubResult) {
        let pool = self.tree.pool();
        let max_size = self.tree.payload_size();
        let mut current = head;
        let mut expected_copies: Option<usize> = None;

        loop {
            if !walk.visited.insert(current) {
                result.report(current, format!("Payload {current} reachable more than once"));
                return;
            }
            result.nodes_checked += 1;

            let (value, copies, next) = match pool.get(current) {
                Ok(Node::Data(data)) if current == head => (&data.value, 1, Handle::NONE),
                Ok(Node::Duplicate(dup)) => (&dup.value, dup.copies, dup.next),
                Ok(other) => {
                    result.report(
                        current,
                        format!("Slot {current} holds {:?}, expected a payload", other.kind()),
                    );
                    return;
                },
                Err(e) => {
                    result.report(current, format!("Cannot read payload {current}: {e}"));
                    return;
                },
            };
            walk.values += 1;

            if value.len() > max_size {
                result.report(
                    current,
                    format!("Payload {current} holds {} bytes, max {max_size}", value.len()),
                );
            }
            if let Some(expected) = expected_copies
                && copies != expected
            {
                result.report(
                    current,
                    format!("Duplicate record {current} counts {copies} copies, expected {expected}"),
                );
                return;
            }

            match next.get() {
                Some(next) => {
                    if copies <= 1 {
                        result.report(current, format!("Duplicate chain continues past {current}"));
                        return;
                    }
                    expected_copies = Some(copies - 1);
                    current = next;
                },
                None => {
                    if copies != 1 {
                        result.report(
                            current,
                            format!("Duplicate chain ends at {current} with {copies} copies"),
                        );
                    }
                    return;
                },
            }
        }
    }

    fn verify_leaf_chain(&self, walk: &Walk, result: &mut ScrubResult) {
        let first = self.tree.first_leaf();
        if walk.leaves.first() != Some(&first) {
            result.report(first, format!("First leaf {first} is not the leftmost leaf"));
            return;
        }

        let mut current = first.get();
        for (position, expected) in walk.leaves.iter().enumerate() {
            let Some(handle) = current else {
                result.report(*expected, format!("Leaf chain ends before leaf {position}"));
                return;
            };
            if handle != *expected {
                result.report(
                    handle,
                    format!("Leaf chain visits {handle} at position {position}, expected {expected}"),
                );
                return;
            }
            current = match self.tree.pool().leaf(handle) {
                Ok(leaf) => leaf.next_leaf.get(),
                Err(e) => {
                    result.report(handle, format!("Cannot follow leaf chain at {handle}: {e}"));
                    return;
                },
            };
        }
        if let Some(extra) = current {
            result.report(extra, format!("Leaf chain continues past the last leaf to {extra}"));
        }
    }

    fn verify_accounting(&self, walk: &Walk, result: &mut ScrubResult) {
        let pool = self.tree.pool();
        let root = self.tree.root();

        for handle in pool.free_list() {
            if walk.visited.contains(&handle) {
                result.report(handle, format!("Slot {handle} is both reachable and free"));
            }
        }
        if walk.visited.len() + pool.free_count() != pool.capacity() {
            result.report(
                root,
                format!(
                    "{} reachable + {} free slots != capacity {}",
                    walk.visited.len(),
                    pool.free_count(),
                    pool.capacity()
                ),
            );
        }
        if walk.keys != self.tree.len() {
            result.report(
                root,
                format!("Found {} keys, tree counts {}", walk.keys, self.tree.len()),
            );
        }
        if walk.values != self.tree.value_count() {
            result.report(
                root,
                format!("Found {} values, tree counts {}", walk.values, self.tree.value_count()),
            );
        }
    }
}
