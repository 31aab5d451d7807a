//! Sharded variant of [`BTreeLockableMap`]: splits the key space across
//! `2^stripe_bits` independent trees so unrelated buckets never contend on
//! the same write lock, then presents them again as one ordered map.
//!
//! A bucket's stripe is the top `stripe_bits` bits of its bucket key —
//! i.e. the bits a [`crate::bucket::id::BucketId`] sets earliest when
//! walking the binary bucket tree from the root. Because key order already
//! sorts on those same high bits first, each stripe owns one contiguous
//! slice of the key space; global ascending iteration is a k-way merge
//! across stripes rather than a full resort.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::Arc,
};

use crate::bucket::{
    btree::{MergeResult, ReadSnapshot},
    id::BucketId,
    lockable::{BTreeLockableMap, LockGuard},
};

pub struct StripedBTreeLockableMap<V> {
    stripe_bits: u32,
    stripes: Vec<BTreeLockableMap<V>>,
}

impl<V> StripedBTreeLockableMap<V> {
    pub fn new(stripe_bits: u32) -> StripedBTreeLockableMap<V> {
        assert!(stripe_bits <= 16, "stripe count must stay bounded");
        let count = 1usize << stripe_bits;
        let mut stripes = Vec::with_capacity(count);
        stripes.resize_with(count, BTreeLockableMap::new);
        StripedBTreeLockableMap { stripe_bits, stripes }
    }

    fn stripe_index(&self, key: u64) -> usize {
        if self.stripe_bits == 0 {
            0
        } else {
            (key >> (64 - self.stripe_bits)) as usize
        }
    }

    fn stripe_for(&self, bucket: &BucketId) -> &BTreeLockableMap<V> {
        &self.stripes[self.stripe_index(bucket.to_key())]
    }

    pub fn lock(&self, bucket: &BucketId) -> LockGuard<'_, V> {
        self.stripe_for(bucket).lock(bucket)
    }

    pub fn try_lock(&self, bucket: &BucketId) -> Option<LockGuard<'_, V>> {
        self.stripe_for(bucket).try_lock(bucket)
    }

    pub fn get(&self, bucket: &BucketId) -> Option<Arc<V>> {
        self.stripe_for(bucket).get(bucket)
    }

    pub fn update_locked(&self, guard: &LockGuard<'_, V>, bucket: &BucketId, value: V) {
        self.stripe_for(bucket).update_locked(guard, bucket, value);
    }

    pub fn remove_locked(&self, guard: &LockGuard<'_, V>, bucket: &BucketId) {
        self.stripe_for(bucket).remove_locked(guard, bucket);
    }

    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Consistent-enough snapshots for a global ascending walk: one
    /// snapshot per stripe, taken without any cross-stripe synchronization.
    /// Matches the teacher's tree snapshots in spirit — each stripe's view
    /// is point-in-time consistent on its own, the union is not a single
    /// atomic instant across the whole map.
    pub fn snapshots(&self) -> Vec<ReadSnapshot<V>> {
        self.stripes.iter().map(|s| s.snapshot()).collect()
    }

    /// Ascending `(key, value)` iteration merged across all stripes.
    pub fn for_each(&self, mut f: impl FnMut(u64, &Arc<V>)) {
        let snaps = self.snapshots();
        let mut buffers: Vec<Vec<(u64, Arc<V>)>> = snaps
            .iter()
            .map(|s| {
                let mut v = vec![];
                s.for_each(|k, val| v.push((k, val.clone())));
                v
            })
            .collect();
        // Stripes hold disjoint, individually-sorted key ranges ordered by
        // stripe index, so concatenation is already globally ascending —
        // still merge defensively via a heap in case a future stripe
        // function ever reorders this.
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();
        let mut cursors = vec![0usize; buffers.len()];
        for (i, buf) in buffers.iter().enumerate() {
            if let Some((k, _)) = buf.first() {
                heap.push(Reverse((*k, i)));
            }
        }
        while let Some(Reverse((key, stripe))) = heap.pop() {
            let cursor = cursors[stripe];
            let (k, v) = buffers[stripe][cursor].clone();
            debug_assert_eq!(k, key);
            f(k, &v);
            cursors[stripe] += 1;
            if let Some((next_key, _)) = buffers[stripe].get(cursors[stripe]) {
                heap.push(Reverse((*next_key, stripe)));
            }
        }
    }

    pub fn get_contained(&self, bucket: &BucketId, mut f: impl FnMut(u64, &Arc<V>)) {
        for snap in self.snapshots() {
            snap.find_parents_self_and_children(bucket, &mut f);
        }
    }

    pub fn merge_stripe(
        &self,
        stripe: usize,
        proc: impl FnMut(u64, &mut V) -> MergeResult,
        insert_before: impl FnMut(&mut dyn FnMut(u64, V)),
        insert_remaining_at_end: impl FnMut(&mut dyn FnMut(u64, V)),
    ) where
        V: Clone,
    {
        self.stripes[stripe].merge(proc, insert_before, insert_remaining_at_end);
    }
}

#[cfg(test)]
#[path = "striped_test.rs"]
mod striped_test;
