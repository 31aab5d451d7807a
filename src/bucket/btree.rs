//! `GenericBTreeBucketDatabase`: a single-writer / multi-reader ordered map
//! from 64-bit bucket key to a generic value, generic over [`DataStoreTraits`]
//! so both the distributor-side `(gcTimestamp, replicas)` value and the
//! content-node-side `BucketInfo` value can share one implementation.
//!
//! The underlying structure is a persistent (path-copying) treap: each
//! mutation builds new nodes only along the path to the changed key and
//! reuses every untouched subtree via `Arc` sharing. Readers take a
//! [`ReadSnapshot`] by atomically cloning the current root `Arc`; the nodes
//! it points at cannot be freed until every `Arc` pointing at them (held by
//! the snapshot or its descendants) is dropped. This gives the "generation
//! pinned memory reclamation" the design calls for without a hand-tracked
//! epoch counter: `Arc`'s strong count already *is* the generation.
//!
//! The root pointer itself is published with the same `AtomicPtr<Arc<_>>`
//! swap the teacher's `mvcc::Snapshot` uses for its in-memory index, adapted
//! here to a sorted key space instead of an ordered key-comparison tree.

use std::{
    cmp,
    sync::{
        atomic::{AtomicPtr, Ordering::Acquire, Ordering::Relaxed, Ordering::Release},
        Arc, Mutex,
    },
};

use crate::bucket::id::{self, BucketId, MAX_USED_BITS};

/// Deterministic 64-bit mixer (splitmix64) used to derive treap priorities
/// from bucket keys, so insertion order never produces a degenerate chain.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn used_bits_of_key(key: u64) -> u32 {
    (key & 0b11_1111) as u32
}

struct Node<V> {
    key: u64,
    value: Arc<V>,
    priority: u64,
    left: Link<V>,
    right: Link<V>,
    /// Minimum used-bits across this node and both subtrees; lets
    /// `find_parents*` skip straight to the shallowest level that could
    /// possibly hold a parent.
    min_used_bits: u32,
    count: usize,
}

type Link<V> = Option<Arc<Node<V>>>;

fn agg_min_used_bits<V>(node: &Link<V>) -> u32 {
    node.as_ref().map(|n| n.min_used_bits).unwrap_or(MAX_USED_BITS)
}

fn agg_count<V>(node: &Link<V>) -> usize {
    node.as_ref().map(|n| n.count).unwrap_or(0)
}

fn make_node<V>(key: u64, value: Arc<V>, left: Link<V>, right: Link<V>) -> Arc<Node<V>> {
    let min_used_bits = cmp::min(used_bits_of_key(key), cmp::min(agg_min_used_bits(&left), agg_min_used_bits(&right)));
    let count = 1 + agg_count(&left) + agg_count(&right);
    Arc::new(Node { key, value, priority: mix64(key), left, right, min_used_bits, count })
}

/// Merge two treaps where every key in `left` is less than every key in `right`.
fn merge<V>(left: Link<V>, right: Link<V>) -> Link<V> {
    match (left, right) {
        (None, r) => r,
        (l, None) => l,
        (Some(l), Some(r)) => {
            if l.priority > r.priority {
                let new_right = merge(l.right.clone(), Some(r));
                Some(make_node(l.key, l.value.clone(), l.left.clone(), new_right))
            } else {
                let new_left = merge(Some(l), r.left.clone());
                Some(make_node(r.key, r.value.clone(), new_left, r.right.clone()))
            }
        }
    }
}

/// Split `node` into (keys < `key`, keys >= `key`).
fn split<V>(node: &Link<V>, key: u64) -> (Link<V>, Link<V>) {
    match node {
        None => (None, None),
        Some(n) => {
            if n.key < key {
                let (l, r) = split(&n.right, key);
                (Some(make_node(n.key, n.value.clone(), n.left.clone(), l)), r)
            } else {
                let (l, r) = split(&n.left, key);
                (l, Some(make_node(n.key, n.value.clone(), r, n.right.clone())))
            }
        }
    }
}

/// Insert `key -> value`, returning the new root and the previous value at
/// `key` if one existed. Implemented as find-old, remove, then a standard
/// priority-ordered treap insert (split the node where `key`'s priority
/// would outrank it, attach as the new local root) — simpler than rotating
/// in place and just as cheap, since every path is rebuilt either way.
fn insert<V>(node: &Link<V>, key: u64, value: Arc<V>) -> (Link<V>, Option<Arc<V>>) {
    let old = find(node, key);
    let base = if old.is_some() { remove(node, key).0 } else { node.clone() };
    (insert_fresh(&base, key, value), old)
}

/// Insert into a subtree known not to already contain `key`.
fn insert_fresh<V>(node: &Link<V>, key: u64, value: Arc<V>) -> Link<V> {
    match node {
        None => Some(make_node(key, value, None, None)),
        Some(n) => {
            if mix64(key) > n.priority {
                let (l, r) = split(&Some(n.clone()), key);
                Some(make_node(key, value, l, r))
            } else if key < n.key {
                let new_left = insert_fresh(&n.left, key, value);
                Some(make_node(n.key, n.value.clone(), new_left, n.right.clone()))
            } else {
                let new_right = insert_fresh(&n.right, key, value);
                Some(make_node(n.key, n.value.clone(), n.left.clone(), new_right))
            }
        }
    }
}

fn find<V>(node: &Link<V>, key: u64) -> Option<Arc<V>> {
    let mut cur = node.clone();
    while let Some(n) = cur {
        if key == n.key {
            return Some(n.value.clone());
        } else if key < n.key {
            cur = n.left.clone();
        } else {
            cur = n.right.clone();
        }
    }
    None
}

fn remove<V>(node: &Link<V>, key: u64) -> (Link<V>, Option<Arc<V>>) {
    match node {
        None => (None, None),
        Some(n) => {
            if key == n.key {
                (merge(n.left.clone(), n.right.clone()), Some(n.value.clone()))
            } else if key < n.key {
                let (new_left, old) = remove(&n.left, key);
                (Some(make_node(n.key, n.value.clone(), new_left, n.right.clone())), old)
            } else {
                let (new_right, old) = remove(&n.right, key);
                (Some(make_node(n.key, n.value.clone(), n.left.clone(), new_right)), old)
            }
        }
    }
}

/// In-order lower-bound: the first node with `key >= target`.
fn lower_bound<V>(node: &Link<V>, target: u64) -> Option<(u64, Arc<V>)> {
    let mut cur = node.clone();
    let mut best: Option<(u64, Arc<V>)> = None;
    while let Some(n) = cur {
        if n.key >= target {
            best = Some((n.key, n.value.clone()));
            cur = n.left.clone();
        } else {
            cur = n.right.clone();
        }
    }
    best
}

/// The last node with `key < target` (used by `getAppropriateBucket`'s
/// one-step predecessor probe).
fn predecessor<V>(node: &Link<V>, target: u64) -> Option<(u64, Arc<V>)> {
    let mut cur = node.clone();
    let mut best: Option<(u64, Arc<V>)> = None;
    while let Some(n) = cur {
        if n.key < target {
            best = Some((n.key, n.value.clone()));
            cur = n.right.clone();
        } else {
            cur = n.left.clone();
        }
    }
    best
}

/// In-order collect of all `(key, value)` pairs with `lo <= key <= hi`
/// (`hi = None` meaning unbounded above).
fn in_order_collect<V>(node: &Link<V>, lo: u64, hi: Option<u64>, out: &mut Vec<(u64, Arc<V>)>) {
    if let Some(n) = node {
        if lo < n.key {
            in_order_collect(&n.left, lo, hi, out);
        }
        if n.key >= lo && hi.map_or(true, |h| n.key <= h) {
            out.push((n.key, n.value.clone()));
        }
        if hi.map_or(true, |h| n.key < h) {
            in_order_collect(&n.right, lo, hi, out);
        }
    }
}

/// Root of one generation of the tree, chained to the generation that will
/// replace it (mirrors the teacher's `MvccRoot::next` chaining).
struct Generation<V> {
    root: Link<V>,
    size: usize,
}

/// Atomically-published pointer to the current generation, cloned by
/// readers the same way `mvcc::Snapshot::clone` clones `MvccRoot`.
struct Published<V> {
    value: AtomicPtr<Arc<Generation<V>>>,
}

impl<V> Published<V> {
    fn new() -> Published<V> {
        let arc = Box::new(Arc::new(Generation { root: None, size: 0 }));
        Published { value: AtomicPtr::new(Box::leak(arc)) }
    }

    fn load(&self) -> Arc<Generation<V>> {
        // Paired with `store`'s release: a reader observing the new root
        // through this load also observes the value writes that produced it.
        Arc::clone(unsafe { self.value.load(Acquire).as_ref().unwrap() })
    }

    fn store(&self, gen: Arc<Generation<V>>) {
        // Callers serialize stores through `write_lock`, so there is only
        // ever one writer reclaiming the previous pointer here, matching
        // `Snapshot::shift_snapshot`'s single-writer assumption. Reclaiming
        // the outer `Box<Arc<_>>` immediately after the swap only frees the
        // pointer slot load() indexes through; any reader that already holds
        // a cloned `Arc<Generation<V>>` keeps the generation itself alive
        // regardless of when this Box drops.
        let boxed = Box::new(gen);
        let old = self.value.swap(Box::leak(boxed), Release);
        unsafe { drop(Box::from_raw(old)) };
    }
}

impl<V> Drop for Published<V> {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.value.load(Relaxed))) };
    }
}

/// A frozen, generation-pinned view of the bucket tree. Holding a snapshot
/// never blocks the writer; it simply keeps the `Arc` chain it references
/// alive until dropped.
pub struct ReadSnapshot<V> {
    gen: Arc<Generation<V>>,
}

impl<V> ReadSnapshot<V> {
    pub fn len(&self) -> usize {
        self.gen.size
    }

    pub fn is_empty(&self) -> bool {
        self.gen.size == 0
    }

    pub fn get(&self, bucket: &BucketId) -> Option<Arc<V>> {
        find(&self.gen.root, bucket.to_key())
    }

    pub fn get_by_raw_key(&self, key: u64) -> Option<Arc<V>> {
        find(&self.gen.root, key)
    }

    /// All keys `k` in the DB such that `bucketOf(k).contains(bucket)`, in
    /// ascending key order. Implements the root-to-leaf parent walk from
    /// the design: seek to the shallowest level any parent could exist at
    /// (the tree's aggregated minimum used-bits), then repeatedly jump to
    /// the next bit-depth at which the two paths can diverge.
    pub fn find_parents_and_self(&self, bucket: &BucketId, mut f: impl FnMut(u64, &Arc<V>)) {
        self.walk_parents(bucket, &mut f, false);
    }

    /// `find_parents_and_self(bucket) ∪ { k | bucket.contains(bucketOf(k)) }`,
    /// in ascending key order.
    pub fn find_parents_self_and_children(&self, bucket: &BucketId, mut f: impl FnMut(u64, &Arc<V>)) {
        self.walk_parents(bucket, &mut f, true);
    }

    fn walk_parents(&self, bucket: &BucketId, f: &mut impl FnMut(u64, &Arc<V>), include_children: bool) {
        if self.gen.root.is_none() {
            return;
        }
        let min_db_bits = agg_min_used_bits(&self.gen.root);
        let bucket_key = bucket.to_key();
        let first_key = BucketId::new(min_db_bits, bucket.raw_id()).to_key();

        let mut seek_key = first_key;
        let mut bits = min_db_bits;
        loop {
            let found = lower_bound(&self.gen.root, seek_key);
            let (k, v) = match found {
                Some(kv) if kv.0 < bucket_key => kv,
                Some((k, v)) if k == bucket_key => {
                    f(k, &v);
                    if include_children {
                        self.collect_and_emit_children(bucket, k, f);
                    }
                    return;
                }
                other => {
                    if include_children {
                        if let Some((k, v)) = other {
                            if bucket.contains(&BucketId::from_key(k)) {
                                f(k, &v);
                                self.collect_and_emit_children(bucket, k, f);
                            }
                        }
                    }
                    return;
                }
            };
            let candidate = BucketId::from_key(k);
            if candidate.contains(bucket) {
                f(k, &v);
            }
            bits = id::next_parent_bit_seek_level(bits, &candidate, bucket);
            if bits > MAX_USED_BITS {
                if include_children {
                    self.collect_and_emit_children(bucket, k, f);
                }
                return;
            }
            seek_key = BucketId::new(bits, bucket.raw_id()).to_key();
        }
    }

    fn collect_and_emit_children(&self, bucket: &BucketId, from_key: u64, f: &mut impl FnMut(u64, &Arc<V>)) {
        let mut all = vec![];
        in_order_collect(&self.gen.root, from_key, None, &mut all);
        for (k, v) in all {
            if k == from_key {
                continue;
            }
            let candidate = BucketId::from_key(k);
            if bucket.contains(&candidate) {
                f(k, &v);
            } else {
                break;
            }
        }
    }

    /// Ascending in-order iteration of `(key, value)` over the whole tree.
    pub fn for_each(&self, mut f: impl FnMut(u64, &Arc<V>)) {
        let mut all = vec![];
        in_order_collect(&self.gen.root, 0, None, &mut all);
        for (k, v) in all {
            f(k, &v);
        }
    }

    /// Most specific bucket key in the tree matching `b`, or `b` padded to
    /// `min_bits` if the tree has no such entry.
    pub fn get_appropriate_bucket(&self, min_bits: u32, bid: &BucketId) -> BucketId {
        let mut bits = min_bits;
        if let Some((k, _)) = lower_bound(&self.gen.root, bid.to_key()) {
            bits = id::min_diff_bits(bits, &BucketId::from_key(k), bid);
        }
        if let Some((k, _)) = predecessor(&self.gen.root, bid.to_key()) {
            bits = id::min_diff_bits(bits, &BucketId::from_key(k), bid);
        }
        BucketId::new(bits, bid.raw_id())
    }

    /// Number of direct child subtrees (0, 1 or 2) under `bucket`.
    pub fn child_subtree_count(&self, bucket: &BucketId) -> u32 {
        assert!(bucket.used_bits() < MAX_USED_BITS);
        let lhs = BucketId::new(bucket.used_bits() + 1, bucket.raw_id());
        let rhs = BucketId::new(bucket.used_bits() + 1, (1u64 << bucket.used_bits()) | bucket.raw_id());
        let lhs_hit = lower_bound(&self.gen.root, lhs.to_key())
            .map_or(false, |(k, _)| lhs.contains(&BucketId::from_key(k)));
        let rhs_hit = lower_bound(&self.gen.root, rhs.to_key())
            .map_or(false, |(k, _)| rhs.contains(&BucketId::from_key(k)));
        lhs_hit as u32 + rhs_hit as u32
    }
}

/// Per-key merge decision, returned by a caller-supplied closure to
/// [`GenericBTreeBucketDatabase::merge`].
pub enum MergeResult {
    Update,
    KeepUnchanged,
    Skip,
}

/// The persistent, single-writer / multi-reader ordered map described above.
pub struct GenericBTreeBucketDatabase<V> {
    published: Published<V>,
    /// Serializes writers; readers never take this lock.
    write_lock: Mutex<()>,
}

impl<V> GenericBTreeBucketDatabase<V> {
    pub fn new() -> GenericBTreeBucketDatabase<V> {
        GenericBTreeBucketDatabase { published: Published::new(), write_lock: Mutex::new(()) }
    }

    pub fn snapshot(&self) -> ReadSnapshot<V> {
        ReadSnapshot { gen: self.published.load() }
    }

    pub fn len(&self) -> usize {
        self.published.load().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, bucket: &BucketId) -> Option<Arc<V>> {
        self.snapshot().get(bucket)
    }

    /// Returns `true` if the bucket pre-existed in the DB.
    pub fn update(&self, bucket: &BucketId, value: V) -> bool {
        let _g = self.write_lock.lock().unwrap();
        let cur = self.published.load();
        let (new_root, old) = insert(&cur.root, bucket.to_key(), Arc::new(value));
        let size = cur.size + if old.is_some() { 0 } else { 1 };
        self.published.store(Arc::new(Generation { root: new_root, size }));
        old.is_some()
    }

    /// Returns `true` if the bucket existed in the DB.
    pub fn remove(&self, bucket: &BucketId) -> bool {
        let _g = self.write_lock.lock().unwrap();
        let cur = self.published.load();
        let (new_root, old) = remove(&cur.root, bucket.to_key());
        if old.is_some() {
            self.published.store(Arc::new(Generation { root: new_root, size: cur.size - 1 }));
            true
        } else {
            false
        }
    }

    /// Read-modify-write in place. `processor` receives the current value
    /// (or `None` if absent, only passed through when
    /// `create_if_nonexisting` is set) and returns the new value, or `None`
    /// to leave the entry untouched / skip creation.
    pub fn process_update(
        &self,
        bucket: &BucketId,
        create_if_nonexisting: bool,
        processor: impl FnOnce(Option<&V>) -> Option<V>,
    ) {
        let _g = self.write_lock.lock().unwrap();
        let cur = self.published.load();
        let existing = find(&cur.root, bucket.to_key());
        if existing.is_none() && !create_if_nonexisting {
            return;
        }
        if let Some(new_value) = processor(existing.as_deref()) {
            let (new_root, old) = insert(&cur.root, bucket.to_key(), Arc::new(new_value));
            let size = cur.size + if old.is_some() { 0 } else { 1 };
            self.published.store(Arc::new(Generation { root: new_root, size }));
        }
    }

    pub fn get_appropriate_bucket(&self, min_bits: u32, bid: &BucketId) -> BucketId {
        self.snapshot().get_appropriate_bucket(min_bits, bid)
    }

    pub fn child_subtree_count(&self, bucket: &BucketId) -> u32 {
        self.snapshot().child_subtree_count(bucket)
    }

    /// Stream the entire tree into a fresh tree, invoking `proc` on each
    /// entry in ascending key order. `proc` returns an update decision per
    /// §4.9; the processor may also splice in new entries ordered before
    /// the entry currently being visited, via `insert_before`, and after
    /// the last one via `insert_remaining_at_end`.
    pub fn merge(
        &self,
        mut proc: impl FnMut(u64, &mut V) -> MergeResult,
        mut insert_before: impl FnMut(&mut dyn FnMut(u64, V)),
        mut insert_remaining_at_end: impl FnMut(&mut dyn FnMut(u64, V)),
    ) where
        V: Clone,
    {
        let _g = self.write_lock.lock().unwrap();
        let cur = self.published.load();
        let mut all = vec![];
        in_order_collect(&cur.root, 0, None, &mut all);

        let mut new_root: Link<V> = None;
        let mut size = 0usize;
        let mut push = |root: &mut Link<V>, size: &mut usize, key: u64, value: V| {
            let (r, old) = insert(root, key, Arc::new(value));
            *root = r;
            if old.is_none() {
                *size += 1;
            }
        };

        for (key, value) in all.into_iter() {
            insert_before(&mut |k, v| push(&mut new_root, &mut size, k, v));
            let mut owned = (*value).clone();
            match proc(key, &mut owned) {
                MergeResult::Update => push(&mut new_root, &mut size, key, owned),
                MergeResult::KeepUnchanged => push(&mut new_root, &mut size, key, (*value).clone()),
                MergeResult::Skip => {}
            }
        }
        insert_remaining_at_end(&mut |k, v| push(&mut new_root, &mut size, k, v));

        self.published.store(Arc::new(Generation { root: new_root, size }));
    }
}

impl<V> Default for GenericBTreeBucketDatabase<V> {
    fn default() -> GenericBTreeBucketDatabase<V> {
        GenericBTreeBucketDatabase::new()
    }
}

unsafe impl<V: Send + Sync> Send for GenericBTreeBucketDatabase<V> {}
unsafe impl<V: Send + Sync> Sync for GenericBTreeBucketDatabase<V> {}

#[cfg(test)]
#[path = "btree_test.rs"]
mod btree_test;
