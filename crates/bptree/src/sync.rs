//! Shared tree handle for multi-threaded callers.
//!
//! [`Tree`] itself is single-threaded: mutations take `&mut self`. When a
//! tree has to be reachable from several threads, [`SharedTree`] puts it
//! behind a reader-writer lock. Readers run concurrently, writers are
//! serialised, and each call holds the lock for exactly one tree operation.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    btree::Tree,
    error::Result,
    integrity::{IntegrityScrubber, ScrubResult},
    types::{Handle, KeyComparator},
};

/// Cloneable, lock-protected handle to a [`Tree`].
///
/// Results that borrow from the tree are copied out before the lock is
/// released, so values are returned as owned `Vec<u8>`.
pub struct SharedTree<K, C> {
    inner: Arc<RwLock<Tree<K, C>>>,
}

impl<K, C> Clone for SharedTree<K, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, C> SharedTree<K, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Wraps `tree` for shared access.
    pub fn new(tree: Tree<K, C>) -> Self {
        Self { inner: Arc::new(RwLock::new(tree)) }
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Tree<K, C>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut Tree<K, C>) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Inserts a value under `key`. See [`Tree::insert`].
    ///
    /// # Errors
    ///
    /// Same as [`Tree::insert`].
    pub fn insert(&self, key: K, data: &[u8]) -> Result<Handle> {
        self.inner.write().insert(key, data)
    }

    /// Removes the newest value under `key`. See [`Tree::delete`].
    ///
    /// # Errors
    ///
    /// Same as [`Tree::delete`].
    pub fn delete(&self, key: &K) -> Result<()> {
        self.inner.write().delete(key)
    }

    /// Returns a copy of the newest value under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`Tree::get`].
    pub fn get(&self, key: &K) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key)?.map(<[u8]>::to_vec))
    }

    /// Returns `true` if `key` has at least one value.
    ///
    /// # Errors
    ///
    /// Same as [`Tree::contains_key`].
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        self.inner.read().contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Runs the integrity scrubber under the read lock.
    pub fn scrub(&self) -> ScrubResult {
        let tree = self.inner.read();
        IntegrityScrubber::new(&*tree).verify()
    }
}
