use super::*;
use crate::bucket::manager::ClusterStateSource;
use crate::config::BucketManagerConfig;
use std::{collections::HashMap as StdHashMap, sync::Mutex};

struct FakeLister {
    lists: StdHashMap<(u16, u16), Vec<BucketId>>,
    infos: Mutex<StdHashMap<u64, Option<BucketInfo>>>,
}

impl PersistenceBucketLister for FakeLister {
    fn read_bucket_list(&self, space: u16, partition: u16) -> Vec<BucketId> {
        self.lists.get(&(space, partition)).cloned().unwrap_or_default()
    }
    fn read_bucket_info(&self, _space: u16, _partition: u16, bucket: &BucketId) -> Option<BucketInfo> {
        self.infos.lock().unwrap().get(&bucket.to_key()).cloned().flatten()
    }
}

struct NoOwner;
impl ClusterStateSource for NoOwner {
    fn owner_of(&self, _bucket: &BucketId, _distribution_hash: u64) -> u16 {
        0
    }
    fn our_distribution_hash(&self) -> u64 {
        0
    }
}

fn test_manager() -> BucketManager {
    BucketManager::new(Box::new(NoOwner), Box::new(|_| {}), BucketManagerConfig::default())
}

#[test]
fn test_list_phase_registers_all_buckets() {
    let b1 = BucketId::new(16, 1);
    let b2 = BucketId::new(16, 2);
    let mut lists = StdHashMap::new();
    lists.insert((0u16, 0u16), vec![b1, b2]);
    let lister = FakeLister { lists, infos: Mutex::new(StdHashMap::new()) };
    let manager = test_manager();
    let mut init = StorageBucketDBInitializer::new(&lister, vec![0], vec![0], 1, 4, 0.5);
    init.run_list_phase(&manager);
    assert_eq!(manager.db().len(), 2);
    assert!(init.is_done() == false);
}

#[test]
fn test_scan_phase_removes_failed_reads() {
    let b1 = BucketId::new(16, 1);
    let mut lists = StdHashMap::new();
    lists.insert((0u16, 0u16), vec![b1]);
    let mut infos = StdHashMap::new();
    infos.insert(b1.to_key(), None);
    let lister = FakeLister { lists, infos: Mutex::new(infos) };
    let manager = test_manager();
    let mut init = StorageBucketDBInitializer::new(&lister, vec![0], vec![0], 1, 4, 0.5);
    init.run_list_phase(&manager);
    init.run_scan_phase(&manager);
    assert!(manager.db().get(&b1).is_none());
    assert!(init.is_done());
}

#[test]
fn test_scan_phase_keeps_successful_reads() {
    let b1 = BucketId::new(16, 1);
    let mut lists = StdHashMap::new();
    lists.insert((0u16, 0u16), vec![b1]);
    let mut infos = StdHashMap::new();
    infos.insert(b1.to_key(), Some(BucketInfo { doc_count: 9, ..BucketInfo::empty() }));
    let lister = FakeLister { lists, infos: Mutex::new(infos) };
    let manager = test_manager();
    let mut init = StorageBucketDBInitializer::new(&lister, vec![0], vec![0], 1, 4, 0.5);
    init.run_list_phase(&manager);
    init.run_scan_phase(&manager);
    assert_eq!(manager.db().get(&b1).unwrap().doc_count, 9);
}

#[test]
fn test_progress_reaches_one_when_done() {
    let lister = FakeLister { lists: StdHashMap::new(), infos: Mutex::new(StdHashMap::new()) };
    let manager = test_manager();
    let mut init = StorageBucketDBInitializer::new(&lister, vec![0], vec![0], 1, 4, 0.5);
    init.run_list_phase(&manager);
    init.run_scan_phase(&manager);
    assert!(init.is_done());
    assert!((init.progress() - 1.0).abs() < 1e-9);
}
