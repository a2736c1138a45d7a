//! Node handles and key ordering.
//!
//! A [`Handle`] addresses one slot of the node pool. Key ordering is a
//! pluggable capability: the tree never compares keys itself, it asks its
//! [`KeyComparator`].

use std::{cmp::Ordering, fmt};

/// Opaque reference to a node pool slot.
///
/// Handles are only meaningful for the pool that issued them.
/// [`Handle::NONE`] is the "no node" sentinel used by next-leaf and
/// duplicate-chain links.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Sentinel for "no node".
    pub const NONE: Handle = Handle(u32::MAX);

    /// Creates a handle for slot `index`.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for the [`Handle::NONE`] sentinel.
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Converts the sentinel into `None`.
    pub const fn get(self) -> Option<Handle> {
        if self.is_none() { None } else { Some(self) }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() { f.write_str("Handle(NONE)") } else { write!(f, "Handle({})", self.0) }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() { f.write_str("#none") } else { write!(f, "#{}", self.0) }
    }
}

/// Total order over keys, supplied by the caller.
pub trait KeyComparator<K> {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<K: Ord> KeyComparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K, F> KeyComparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}
