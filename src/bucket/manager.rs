//! `BucketManager`: the content node's coordinator between incoming bucket
//! protocol requests and the bucket database — request routing, the
//! cluster-state initiated/completed visibility barrier, the write-side
//! conflict-set FIFO, and the stale-timestamp mutation gate.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Mutex,
    },
};

use log::info;

use crate::{
    bucket::{
        id::BucketId,
        lockable::BTreeLockableMap,
        minbits::MinimumUsedBitsTracker,
        traits::BucketInfo,
    },
    config::BucketManagerConfig,
};

/// Supplies cluster topology facts the manager cannot compute itself — a
/// named collaborator per the design's scope boundary, not a real
/// distribution/cluster-state subsystem.
pub trait ClusterStateSource: Send + Sync {
    /// Owning distributor index for `bucket` under the distribution given
    /// by `distribution_hash`.
    fn owner_of(&self, bucket: &BucketId, distribution_hash: u64) -> u16;
    /// This node's own distribution hash, compared against the requester's.
    fn our_distribution_hash(&self) -> u64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    BucketInfo { bucket: BucketId, info: BucketInfo },
    FullBucketInfo { owned: HashMap<u16, Vec<BucketId>> },
    MutationAck { bucket: BucketId },
    SplitAck { from: BucketId, into: (BucketId, BucketId) },
    JoinAck { into: BucketId, from: (BucketId, BucketId) },
    DeleteAck { bucket: BucketId },
    Rejected { reason: String },
    StaleTimestamp { incoming: u64, last_modified: u64 },
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Default)]
pub struct BucketManagerMetrics {
    pub small_requests: AtomicU64,
    pub full_requests: AtomicU64,
    pub full_requests_rejected: AtomicU64,
    pub mutations_applied: AtomicU64,
    pub mutations_stale: AtomicU64,
    pub min_used_bits_decreases: AtomicU64,
}

struct QueuedReply {
    bucket_key: u64,
    reply: Reply,
}

pub struct BucketManager {
    db: BTreeLockableMap<BucketInfo>,
    min_bits_tracker: MinimumUsedBitsTracker,
    cluster: Box<dyn ClusterStateSource>,
    sink: Box<dyn Fn(Reply) + Send + Sync>,
    config: BucketManagerConfig,

    last_initiated: AtomicU32,
    last_completed: AtomicU32,

    /// Count of full `requestBucketInfo` operations currently walking the
    /// DB. While non-zero, mutation replies touching a conflicted bucket
    /// queue instead of going out immediately.
    processing_count: AtomicU32,
    conflict_set: Mutex<HashSet<u64>>,
    fifo: Mutex<VecDeque<QueuedReply>>,

    pub metrics: BucketManagerMetrics,
}

impl BucketManager {
    pub fn new(
        cluster: Box<dyn ClusterStateSource>,
        sink: Box<dyn Fn(Reply) + Send + Sync>,
        config: BucketManagerConfig,
    ) -> BucketManager {
        BucketManager {
            db: BTreeLockableMap::new(),
            min_bits_tracker: MinimumUsedBitsTracker::new(),
            cluster,
            sink,
            config,
            last_initiated: AtomicU32::new(0),
            last_completed: AtomicU32::new(0),
            processing_count: AtomicU32::new(0),
            conflict_set: Mutex::new(HashSet::new()),
            fifo: Mutex::new(VecDeque::new()),
            metrics: BucketManagerMetrics::default(),
        }
    }

    pub fn db(&self) -> &BTreeLockableMap<BucketInfo> {
        &self.db
    }

    /// Called when a cluster state change starts propagating down to this
    /// node.
    pub fn on_set_system_state(&self, version: u32) {
        self.last_initiated.store(version, Ordering::Release);
    }

    /// Called once this node's own processing of that state change
    /// completes and the reply travels back up.
    pub fn on_set_system_state_reply(&self, version: u32) {
        self.last_completed.store(version, Ordering::Release);
    }

    fn barrier_open_for(&self, version: u32, distribution_hash: u64) -> bool {
        self.last_initiated.load(Ordering::Acquire) == version
            && self.last_completed.load(Ordering::Acquire) == version
            && self.cluster.our_distribution_hash() == distribution_hash
    }

    /// Small `requestBucketInfo`: explicit bucket set, answered
    /// synchronously from the current DB snapshot.
    pub fn request_bucket_info_small(&self, buckets: &[BucketId]) -> Vec<Reply> {
        self.metrics.small_requests.fetch_add(1, Ordering::Relaxed);
        buckets
            .iter()
            .map(|b| {
                let info = self.db.get(b).map(|arc| *arc).unwrap_or_default();
                Reply::BucketInfo { bucket: *b, info }
            })
            .collect()
    }

    /// Full `requestBucketInfo`: cluster-state attached, rejected unless
    /// the initiated/completed/distribution-hash barrier is open for
    /// `version`. On success, walks the whole DB computing ownership.
    pub fn request_bucket_info_full(&self, version: u32, distribution_hash: u64) -> Reply {
        self.metrics.full_requests.fetch_add(1, Ordering::Relaxed);
        if !self.barrier_open_for(version, distribution_hash) {
            self.metrics.full_requests_rejected.fetch_add(1, Ordering::Relaxed);
            return Reply::Rejected {
                reason: format!(
                    "cluster state not settled for version {} (initiated={}, completed={})",
                    version,
                    self.last_initiated.load(Ordering::Acquire),
                    self.last_completed.load(Ordering::Acquire)
                ),
            };
        }

        self.processing_count.fetch_add(1, Ordering::AcqRel);
        let mut owned: HashMap<u16, Vec<BucketId>> = HashMap::new();
        self.db.for_each(|key, _| {
            let bucket = BucketId::from_key(key);
            let owner = self.cluster.owner_of(&bucket, distribution_hash);
            owned.entry(owner).or_default().push(bucket);
        });
        let reply = Reply::FullBucketInfo { owned };
        self.finish_full_request(reply.clone());
        reply
    }

    /// Ends this full request's processing window. If it was the last one
    /// in flight, `full_info_reply` is pushed to the front of the fifo so
    /// it reaches `sink` strictly before any conflicting reply that queued
    /// up behind it, then the rest of the fifo drains in arrival order.
    fn finish_full_request(&self, full_info_reply: Reply) {
        if self.processing_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.fifo.lock().unwrap().push_front(QueuedReply { bucket_key: u64::MAX, reply: full_info_reply });
            self.drain_fifo();
        }
    }

    fn drain_fifo(&self) {
        let mut fifo = self.fifo.lock().unwrap();
        let mut conflicts = self.conflict_set.lock().unwrap();
        while let Some(q) = fifo.pop_front() {
            (self.sink)(q.reply);
        }
        conflicts.clear();
    }

    fn deliver_or_queue(&self, bucket_key: u64, reply: Reply) {
        if self.processing_count.load(Ordering::Acquire) > 0 {
            let conflicts = self.conflict_set.lock().unwrap();
            if conflicts.contains(&bucket_key) {
                drop(conflicts);
                self.fifo.lock().unwrap().push_back(QueuedReply { bucket_key, reply });
                return;
            }
        }
        (self.sink)(reply);
    }

    /// Put/update/remove on `bucket`: gated by the in-DB `last_modified`
    /// timestamp, then applied and its ack routed through the conflict
    /// FIFO if a full request is mid-flight and already touched this key.
    pub fn apply_mutation(
        &self,
        bucket: &BucketId,
        timestamp_secs: u64,
        mutate: impl FnOnce(Option<BucketInfo>) -> BucketInfo,
    ) -> Result<(), Reply> {
        let guard = self.db.lock(bucket);
        let existing = self.db.get(bucket);
        if let Some(info) = &existing {
            if info.last_modified_secs >= timestamp_secs {
                self.metrics.mutations_stale.fetch_add(1, Ordering::Relaxed);
                return Err(Reply::StaleTimestamp { incoming: timestamp_secs, last_modified: info.last_modified_secs });
            }
        }
        let new_info = mutate(existing.as_deref().copied());
        self.db.update_locked(&guard, bucket, new_info);
        drop(guard);
        self.metrics.mutations_applied.fetch_add(1, Ordering::Relaxed);

        let in_conflict = self.conflict_set.lock().unwrap().contains(&bucket.to_key());
        if self.processing_count.load(Ordering::Acquire) > 0 && in_conflict {
            self.deliver_or_queue(bucket.to_key(), Reply::MutationAck { bucket: *bucket });
        } else {
            (self.sink)(Reply::MutationAck { bucket: *bucket });
        }
        Ok(())
    }

    fn record_used_bits(&self, used_bits: u32) {
        if self.min_bits_tracker.update(used_bits) {
            self.metrics.min_used_bits_decreases.fetch_add(1, Ordering::Relaxed);
            info!("minimum used bits decreased to {}", self.min_bits_tracker.current());
        }
    }

    /// Split `from` into `(b1, info1)` and `(b2, info2)`. Per the design,
    /// split/join/delete replies unconditionally enter the conflict FIFO
    /// and mark their buckets conflicted, even if no full request is
    /// currently in flight (the queue is then drained immediately since
    /// `processing_count` is 0).
    pub fn split(&self, from: &BucketId, b1: BucketId, info1: BucketInfo, b2: BucketId, info2: BucketInfo) {
        {
            let g1 = self.db.lock(&b1);
            self.db.update_locked(&g1, &b1, info1);
            let g2 = self.db.lock(&b2);
            self.db.update_locked(&g2, &b2, info2);
            let gfrom = self.db.lock(from);
            self.db.remove_locked(&gfrom, from);
        }
        self.record_used_bits(b1.used_bits());
        self.record_used_bits(b2.used_bits());

        let mut conflicts = self.conflict_set.lock().unwrap();
        conflicts.insert(from.to_key());
        conflicts.insert(b1.to_key());
        conflicts.insert(b2.to_key());
        drop(conflicts);
        self.fifo.lock().unwrap().push_back(QueuedReply {
            bucket_key: from.to_key(),
            reply: Reply::SplitAck { from: *from, into: (b1, b2) },
        });
        if self.processing_count.load(Ordering::Acquire) == 0 {
            self.drain_fifo();
        }
    }

    pub fn join(&self, b1: &BucketId, b2: &BucketId, into: BucketId, info: BucketInfo) {
        {
            let g1 = self.db.lock(b1);
            self.db.remove_locked(&g1, b1);
            let g2 = self.db.lock(b2);
            self.db.remove_locked(&g2, b2);
            let ginto = self.db.lock(&into);
            self.db.update_locked(&ginto, &into, info);
        }
        self.record_used_bits(into.used_bits());

        let mut conflicts = self.conflict_set.lock().unwrap();
        conflicts.insert(b1.to_key());
        conflicts.insert(b2.to_key());
        conflicts.insert(into.to_key());
        drop(conflicts);
        self.fifo
            .lock()
            .unwrap()
            .push_back(QueuedReply { bucket_key: into.to_key(), reply: Reply::JoinAck { into, from: (*b1, *b2) } });
        if self.processing_count.load(Ordering::Acquire) == 0 {
            self.drain_fifo();
        }
    }

    pub fn delete_bucket(&self, bucket: &BucketId) {
        let guard = self.db.lock(bucket);
        self.db.remove_locked(&guard, bucket);
        drop(guard);

        self.conflict_set.lock().unwrap().insert(bucket.to_key());
        self.fifo
            .lock()
            .unwrap()
            .push_back(QueuedReply { bucket_key: bucket.to_key(), reply: Reply::DeleteAck { bucket: *bucket } });
        if self.processing_count.load(Ordering::Acquire) == 0 {
            self.drain_fifo();
        }
    }

    pub fn create_bucket(&self, bucket: &BucketId, info: BucketInfo) {
        let guard = self.db.lock(bucket);
        self.db.update_locked(&guard, bucket, info);
        drop(guard);
        self.record_used_bits(bucket.used_bits());
    }

    /// Register a bucket discovered during init, without touching the
    /// conflict FIFO (no protocol reply is outstanding for it).
    pub fn register_bucket(&self, bucket: &BucketId, info: BucketInfo) {
        let guard = self.db.lock(bucket);
        self.db.update_locked(&guard, bucket, info);
        drop(guard);
        self.record_used_bits(bucket.used_bits());
    }

    pub fn worker_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.worker_poll_millis)
    }

    /// `<bucket id="0x…">…</bucket>` stream per the status page contract.
    pub fn dump_xml(&self, showall: bool) -> String {
        let mut out = String::from("<bucketdb>\n");
        self.db.for_each(|key, info| {
            let bucket = BucketId::from_key(key);
            out.push_str(&format!(
                "  <bucket id=\"0x{:016x}\" usedbits=\"{}\" doccount=\"{}\" checksum=\"0x{:08x}\"",
                key,
                bucket.used_bits(),
                info.doc_count,
                info.checksum
            ));
            if showall {
                out.push_str(&format!(
                    " active=\"{}\" ready=\"{}\" lastmodified=\"{}\"",
                    info.active, info.ready, info.last_modified_secs
                ));
            }
            out.push_str("></bucket>\n");
        });
        out.push_str("</bucketdb>\n");
        out
    }

    pub fn dump_html(&self) -> String {
        let mut out = String::from("<html><body><ul>\n");
        self.db.for_each(|key, info| {
            out.push_str(&format!("<li>0x{:016x} ({} docs)</li>\n", key, info.doc_count));
        });
        out.push_str("</ul></body></html>\n");
        out
    }
}

#[cfg(test)]
mod manager_test {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct FixedOwner;
    impl ClusterStateSource for FixedOwner {
        fn owner_of(&self, bucket: &BucketId, _distribution_hash: u64) -> u16 {
            (bucket.raw_id() % 4) as u16
        }
        fn our_distribution_hash(&self) -> u64 {
            42
        }
    }

    fn manager_with_sink() -> (BucketManager, Arc<StdMutex<Vec<Reply>>>) {
        let received = Arc::new(StdMutex::new(vec![]));
        let received2 = received.clone();
        let mgr = BucketManager::new(
            Box::new(FixedOwner),
            Box::new(move |r| received2.lock().unwrap().push(r)),
            BucketManagerConfig::default(),
        );
        (mgr, received)
    }

    #[test]
    fn test_full_request_rejected_without_barrier() {
        let (mgr, _) = manager_with_sink();
        let reply = mgr.request_bucket_info_full(1, 42);
        assert!(matches!(reply, Reply::Rejected { .. }));
    }

    #[test]
    fn test_full_request_succeeds_when_barrier_open() {
        let (mgr, _) = manager_with_sink();
        mgr.on_set_system_state(1);
        mgr.on_set_system_state_reply(1);
        mgr.create_bucket(&BucketId::new(16, 1), BucketInfo::empty());
        let reply = mgr.request_bucket_info_full(1, 42);
        match reply {
            Reply::FullBucketInfo { owned } => assert_eq!(owned.values().map(|v| v.len()).sum::<usize>(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_full_request_rejected_on_distribution_hash_mismatch() {
        let (mgr, _) = manager_with_sink();
        mgr.on_set_system_state(1);
        mgr.on_set_system_state_reply(1);
        let reply = mgr.request_bucket_info_full(1, 999);
        assert!(matches!(reply, Reply::Rejected { .. }));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let (mgr, _) = manager_with_sink();
        let b = BucketId::new(16, 1);
        mgr.apply_mutation(&b, 100, |_| BucketInfo { last_modified_secs: 100, ..BucketInfo::empty() }).unwrap();
        let result = mgr.apply_mutation(&b, 50, |_| BucketInfo::empty());
        assert!(matches!(result, Err(Reply::StaleTimestamp { .. })));
    }

    #[test]
    fn test_split_reply_delivered_after_conflicting_full_info_reply() {
        let (mgr, received) = manager_with_sink();
        let from = BucketId::new(1, 0);
        mgr.create_bucket(&from, BucketInfo::empty());
        mgr.on_set_system_state(1);
        mgr.on_set_system_state_reply(1);

        // Simulate a full request in flight by bumping the counter directly
        // via two nested full requests is awkward with this API, so drive
        // the scenario through the public surface: begin a full request
        // that, mid-walk, has a split queued behind it by relying on the
        // split being issued while processing_count is still elevated.
        mgr.processing_count.fetch_add(1, Ordering::AcqRel);
        let b1 = BucketId::new(2, 0);
        let b2 = BucketId::new(2, 0b10);
        mgr.split(&from, b1, BucketInfo::empty(), b2, BucketInfo::empty());
        assert!(received.lock().unwrap().is_empty(), "split reply must not be delivered while full request is in flight");

        mgr.finish_full_request(Reply::FullBucketInfo { owned: HashMap::new() });
        let got = received.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], Reply::FullBucketInfo { .. }), "full info reply must be delivered first");
        assert!(matches!(got[1], Reply::SplitAck { .. }));
    }

    #[test]
    fn test_request_bucket_info_full_delivers_before_conflicting_replies() {
        // Exercises the real public entry point end to end (unlike the test
        // above, which pokes `finish_full_request` directly): a split
        // queued while a conflict window is open must reach `sink` after
        // the full-info reply produced by the `request_bucket_info_full`
        // call that actually drains it.
        let (mgr, received) = manager_with_sink();
        let from = BucketId::new(1, 0);
        mgr.create_bucket(&from, BucketInfo::empty());
        mgr.on_set_system_state(1);
        mgr.on_set_system_state_reply(1);

        // Open a conflict window (stands in for another full request's
        // walk being in flight), queue a split behind it, then close the
        // window without draining — same bookkeeping `finish_full_request`
        // would leave behind, so the drain below is attributable solely to
        // the `request_bucket_info_full` call that follows.
        mgr.processing_count.fetch_add(1, Ordering::AcqRel);
        let b1 = BucketId::new(2, 0);
        let b2 = BucketId::new(2, 0b10);
        mgr.split(&from, b1, BucketInfo::empty(), b2, BucketInfo::empty());
        assert!(received.lock().unwrap().is_empty(), "split reply must not be delivered while the conflict window is open");
        mgr.processing_count.fetch_sub(1, Ordering::AcqRel);

        let reply = mgr.request_bucket_info_full(1, 42);
        assert!(matches!(reply, Reply::FullBucketInfo { .. }));

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], Reply::FullBucketInfo { .. }), "full info reply must reach sink first");
        assert!(matches!(got[1], Reply::SplitAck { .. }));
    }

    #[test]
    fn test_min_used_bits_tracked_on_create() {
        let (mgr, _) = manager_with_sink();
        mgr.create_bucket(&BucketId::new(8, 0), BucketInfo::empty());
        assert_eq!(mgr.min_bits_tracker.current(), 8);
    }

    #[test]
    fn test_dump_xml_contains_bucket_entries() {
        let (mgr, _) = manager_with_sink();
        mgr.create_bucket(&BucketId::new(16, 7), BucketInfo { doc_count: 3, ..BucketInfo::empty() });
        let xml = mgr.dump_xml(true);
        assert!(xml.contains("doccount=\"3\""));
    }
}
