//! Per-key exclusive locking over a [`GenericBTreeBucketDatabase`].
//!
//! Most bucket operations (splits, joins, merges-into-one) need exclusive
//! access to one or more bucket keys for the duration of several DB calls,
//! not just a single atomic `update`. `BTreeLockableMap` layers a
//! process-wide set of held keys and a condition variable on top of the
//! lock-free tree: acquiring a key blocks only threads contending for that
//! *same* key, never all readers or writers of the tree itself.

use std::{
    collections::HashSet,
    sync::{Arc, Condvar, Mutex},
};

use crate::bucket::{
    btree::{GenericBTreeBucketDatabase, MergeResult, ReadSnapshot},
    id::BucketId,
};

struct LockState {
    held: HashSet<u64>,
}

/// Guard returned by [`BTreeLockableMap::lock`]; releases the key and wakes
/// any waiters when dropped.
pub struct LockGuard<'a, V> {
    map: &'a BTreeLockableMap<V>,
    key: u64,
}

impl<'a, V> Drop for LockGuard<'a, V> {
    fn drop(&mut self) {
        let mut state = self.map.state.lock().unwrap();
        state.held.remove(&self.key);
        self.map.condvar.notify_all();
    }
}

/// Wraps a [`GenericBTreeBucketDatabase`] with per-key exclusive locking.
pub struct BTreeLockableMap<V> {
    db: GenericBTreeBucketDatabase<V>,
    state: Mutex<LockState>,
    condvar: Condvar,
}

impl<V> BTreeLockableMap<V> {
    pub fn new() -> BTreeLockableMap<V> {
        BTreeLockableMap {
            db: GenericBTreeBucketDatabase::new(),
            state: Mutex::new(LockState { held: HashSet::new() }),
            condvar: Condvar::new(),
        }
    }

    /// Block until `bucket`'s key is not held by anyone else, then hold it
    /// until the returned guard drops.
    pub fn lock(&self, bucket: &BucketId) -> LockGuard<'_, V> {
        let key = bucket.to_key();
        let mut state = self.state.lock().unwrap();
        while state.held.contains(&key) {
            state = self.condvar.wait(state).unwrap();
        }
        state.held.insert(key);
        LockGuard { map: self, key }
    }

    /// Non-blocking variant of [`Self::lock`].
    pub fn try_lock(&self, bucket: &BucketId) -> Option<LockGuard<'_, V>> {
        let key = bucket.to_key();
        let mut state = self.state.lock().unwrap();
        if state.held.contains(&key) {
            None
        } else {
            state.held.insert(key);
            Some(LockGuard { map: self, key })
        }
    }

    pub fn snapshot(&self) -> ReadSnapshot<V> {
        self.db.snapshot()
    }

    pub fn get(&self, bucket: &BucketId) -> Option<Arc<V>> {
        self.db.get(bucket)
    }

    /// Caller must already hold `bucket`'s lock.
    pub fn update_locked(&self, _guard: &LockGuard<'_, V>, bucket: &BucketId, value: V) {
        self.db.update(bucket, value);
    }

    /// Caller must already hold `bucket`'s lock.
    pub fn remove_locked(&self, _guard: &LockGuard<'_, V>, bucket: &BucketId) {
        self.db.remove(bucket);
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Lock-free bulk read: every bucket key containing `bucket`, and every
    /// bucket key `bucket` contains.
    pub fn get_contained(&self, bucket: &BucketId, f: impl FnMut(u64, &Arc<V>)) {
        self.db.snapshot().find_parents_self_and_children(bucket, f);
    }

    pub fn for_each(&self, f: impl FnMut(u64, &Arc<V>)) {
        self.db.snapshot().for_each(f);
    }

    pub fn merge(
        &self,
        proc: impl FnMut(u64, &mut V) -> MergeResult,
        insert_before: impl FnMut(&mut dyn FnMut(u64, V)),
        insert_remaining_at_end: impl FnMut(&mut dyn FnMut(u64, V)),
    ) where
        V: Clone,
    {
        self.db.merge(proc, insert_before, insert_remaining_at_end);
    }
}

impl<V> Default for BTreeLockableMap<V> {
    fn default() -> BTreeLockableMap<V> {
        BTreeLockableMap::new()
    }
}

#[cfg(test)]
#[path = "lockable_test.rs"]
mod lockable_test;
