//! Fixed-capacity node pool.
//!
//! All tree nodes and payload records live in one pool of uniformly typed
//! slots. Free slots form a singly-linked list threaded through the slots
//! themselves, so allocation and release are O(1) and need no side
//! structure:
//!
//! ```text
//!  head ──► [3: Free→0] ──► [0: Free→5] ──► [5: Free→NONE]
//!           [1: Occupied]   [2: Occupied]   [4: Occupied]
//! ```
//!
//! The pool never grows. Running out of slots is reported as
//! [`Error::PoolExhausted`]; callers that need all-or-nothing behaviour
//! check [`NodePool::free_count`] before their first allocation.

use crate::{
    error::{Error, Result},
    types::Handle,
};

/// One pool slot.
#[derive(Debug, Clone)]
enum Slot<T> {
    /// Unused; `next` links to the following free slot.
    Free { next: Handle },
    /// Holds a live node.
    Occupied(T),
}

/// Fixed-capacity arena with an intrusive free list.
#[derive(Debug, Clone)]
pub struct NodePool<T> {
    slots: Vec<Slot<T>>,
    /// First free slot, or [`Handle::NONE`] when exhausted.
    free_head: Handle,
    /// Number of slots on the free list.
    free_count: usize,
}

impl<T> NodePool<T> {
    /// Creates a pool of `capacity` slots, all on the free list.
    ///
    /// Slots are handed out in ascending index order.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity < u32::MAX as usize);
        let slots = (0..capacity)
            .map(|i| {
                let next = if i + 1 < capacity { Handle::new((i + 1) as u32) } else { Handle::NONE };
                Slot::Free { next }
            })
            .collect();
        let free_head = if capacity > 0 { Handle::new(0) } else { Handle::NONE };
        Self { slots, free_head, free_count: capacity }
    }

    /// Takes the head of the free list and stores `node` in it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if no slot is free.
    pub fn allocate(&mut self, node: T) -> Result<Handle> {
        let handle = self.free_head;
        if handle.is_none() {
            return Err(Error::PoolExhausted { capacity: self.capacity() });
        }
        let slot = &mut self.slots[handle.index()];
        let Slot::Free { next } = *slot else {
            return Err(Error::InvalidHandle { handle });
        };
        *slot = Slot::Occupied(node);
        self.free_head = next;
        self.free_count -= 1;
        Ok(handle)
    }

    /// Returns a slot to the free list and hands back its former content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is out of range or the
    /// slot is already free.
    pub fn release(&mut self, handle: Handle) -> Result<T> {
        let free_head = self.free_head;
        let slot = self.slots.get_mut(handle.index()).ok_or(Error::InvalidHandle { handle })?;
        if matches!(slot, Slot::Free { .. }) {
            return Err(Error::InvalidHandle { handle });
        }
        let Slot::Occupied(node) = std::mem::replace(slot, Slot::Free { next: free_head }) else {
            return Err(Error::InvalidHandle { handle });
        };
        self.free_head = handle;
        self.free_count += 1;
        Ok(node)
    }

    /// Returns the node stored at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for free or out-of-range slots.
    pub fn get(&self, handle: Handle) -> Result<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot::Occupied(node)) => Ok(node),
            _ => Err(Error::InvalidHandle { handle }),
        }
    }

    /// Returns the node stored at `handle` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for free or out-of-range slots.
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T> {
        match self.slots.get_mut(handle.index()) {
            Some(Slot::Occupied(node)) => Ok(node),
            _ => Err(Error::InvalidHandle { handle }),
        }
    }

    /// Borrows two distinct slots mutably at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if either slot is free or out of
    /// range, or if both handles are the same.
    pub fn pair_mut(&mut self, a: Handle, b: Handle) -> Result<(&mut T, &mut T)> {
        let (ia, ib) = (a.index(), b.index());
        if ia == ib {
            return Err(Error::InvalidHandle { handle: b });
        }
        if ia.max(ib) >= self.slots.len() {
            let handle = if ia >= self.slots.len() { a } else { b };
            return Err(Error::InvalidHandle { handle });
        }
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        match (first, second) {
            (Slot::Occupied(x), Slot::Occupied(y)) => Ok((x, y)),
            (Slot::Free { .. }, _) => Err(Error::InvalidHandle { handle: a }),
            _ => Err(Error::InvalidHandle { handle: b }),
        }
    }

    /// Returns `true` if `handle` refers to an occupied slot.
    pub fn is_occupied(&self, handle: Handle) -> bool {
        matches!(self.slots.get(handle.index()), Some(Slot::Occupied(_)))
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots on the free list.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of occupied slots.
    pub fn in_use(&self) -> usize {
        self.capacity() - self.free_count
    }

    /// Walks the free list and returns its handles in list order.
    ///
    /// O(free slots); intended for integrity checks.
    pub fn free_list(&self) -> Vec<Handle> {
        let mut result = Vec::with_capacity(self.free_count);
        let mut current = self.free_head;
        while !current.is_none() && result.len() <= self.slots.len() {
            result.push(current);
            current = match self.slots.get(current.index()) {
                Some(Slot::Free { next }) => *next,
                _ => break,
            };
        }
        result
    }
}
