use super::*;
use crate::bucket::id::BucketId;

#[test]
fn test_update_and_get() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let b = BucketId::new(16, 42);
    assert!(!db.update(&b, 7));
    assert_eq!(*db.get(&b).unwrap(), 7);
    assert!(db.update(&b, 8));
    assert_eq!(*db.get(&b).unwrap(), 8);
    assert_eq!(db.len(), 1);
}

#[test]
fn test_remove() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let b = BucketId::new(16, 1);
    db.update(&b, 1);
    assert!(db.remove(&b));
    assert!(db.get(&b).is_none());
    assert!(!db.remove(&b));
}

#[test]
fn test_snapshot_isolated_from_later_writes() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let b = BucketId::new(16, 1);
    db.update(&b, 1);
    let snap = db.snapshot();
    db.update(&b, 2);
    assert_eq!(*snap.get(&b).unwrap(), 1);
    assert_eq!(*db.get(&b).unwrap(), 2);
}

#[test]
fn test_for_each_ascending_key_order() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    for raw in [5u64, 1, 9, 3, 7] {
        db.update(&BucketId::new(16, raw), raw as u32);
    }
    let snap = db.snapshot();
    let mut keys = vec![];
    snap.for_each(|k, _| keys.push(k));
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 5);
}

#[test]
fn test_find_parents_and_self_finds_ancestor() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let parent = BucketId::new(1, 0);
    let child = BucketId::new(3, 0);
    db.update(&parent, 1);
    let snap = db.snapshot();
    let mut hits = vec![];
    snap.find_parents_and_self(&child, |k, v| hits.push((k, **v)));
    assert_eq!(hits, vec![(parent.to_key(), 1)]);
}

#[test]
fn test_find_parents_and_self_finds_self() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let bucket = BucketId::new(3, 0);
    db.update(&bucket, 9);
    let snap = db.snapshot();
    let mut hits = vec![];
    snap.find_parents_and_self(&bucket, |k, v| hits.push((k, **v)));
    assert_eq!(hits, vec![(bucket.to_key(), 9)]);
}

#[test]
fn test_find_parents_self_and_children_includes_descendants() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let parent = BucketId::new(1, 0);
    let left_child = BucketId::new(3, 0);
    let right_child = BucketId::new(3, 0b100);
    let unrelated = BucketId::new(3, 0b010);
    db.update(&parent, 1);
    db.update(&left_child, 2);
    db.update(&right_child, 3);
    db.update(&unrelated, 4);
    let snap = db.snapshot();
    let mut hits = vec![];
    snap.find_parents_self_and_children(&parent, |k, v| hits.push((k, **v)));
    let mut values: Vec<u32> = hits.iter().map(|(_, v)| *v).collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn test_child_subtree_count() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let parent = BucketId::new(1, 0);
    let left_child = BucketId::new(3, 0);
    db.update(&left_child, 1);
    assert_eq!(db.child_subtree_count(&parent), 1);
    let right_child = BucketId::new(3, 0b100);
    db.update(&right_child, 2);
    assert_eq!(db.child_subtree_count(&parent), 2);
}

#[test]
fn test_get_appropriate_bucket_finds_overlap() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let existing = BucketId::new(3, 0);
    db.update(&existing, 1);
    let target = BucketId::new(16, 0);
    let appropriate = db.get_appropriate_bucket(16, &target);
    // The only existing bucket's path agrees with target's across their
    // whole shared prefix, so min_diff_bits must return minBits unchanged.
    assert_eq!(appropriate, BucketId::new(16, 0));
}

#[test]
fn test_process_update_creates_and_mutates() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let b = BucketId::new(16, 1);
    db.process_update(&b, true, |existing| {
        assert!(existing.is_none());
        Some(10)
    });
    assert_eq!(*db.get(&b).unwrap(), 10);
    db.process_update(&b, false, |existing| Some(existing.unwrap() + 1));
    assert_eq!(*db.get(&b).unwrap(), 11);
}

#[test]
fn test_process_update_skips_nonexisting_without_create_flag() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    let b = BucketId::new(16, 1);
    db.process_update(&b, false, |_| panic!("must not be called"));
    assert!(db.get(&b).is_none());
}

#[test]
fn test_merge_updates_and_skips() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    for raw in [1u64, 2, 3] {
        db.update(&BucketId::new(16, raw), raw as u32);
    }
    db.merge(
        |_k, v| {
            if *v == 2 {
                MergeResult::Skip
            } else {
                *v *= 10;
                MergeResult::Update
            }
        },
        |_insert| {},
        |_insert| {},
    );
    assert_eq!(db.len(), 2);
    let snap = db.snapshot();
    let mut values = vec![];
    snap.for_each(|_, v| values.push(**v));
    values.sort_unstable();
    assert_eq!(values, vec![10, 30]);
}

#[test]
fn test_many_inserts_stay_consistent() {
    let db: GenericBTreeBucketDatabase<u32> = GenericBTreeBucketDatabase::new();
    for raw in 0u64..500 {
        db.update(&BucketId::new(20, raw), raw as u32);
    }
    assert_eq!(db.len(), 500);
    let snap = db.snapshot();
    for raw in 0u64..500 {
        assert_eq!(*snap.get(&BucketId::new(20, raw)).unwrap(), raw as u32);
    }
}
