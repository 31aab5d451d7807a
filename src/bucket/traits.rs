//! Values stored in a [`crate::bucket::btree::GenericBTreeBucketDatabase`].
//!
//! The database is generic over its value type; the content node only ever
//! instantiates it with [`BucketInfo`]. [`DistributorBucketValue`] and
//! [`BucketCopy`] are carried for completeness (the wire format a content
//! node reports into) but are not themselves stored in this node's DB — a
//! distributor process would instantiate the same generic tree with that
//! value type instead.

use serde::{Deserialize, Serialize};

/// Content-node-side bucket summary: everything the cluster controller and
/// distributor need to know about a bucket's contents without fetching it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub doc_count: u32,
    pub total_doc_size: u64,
    /// Aggregate checksum over the bucket's documents; order-independent so
    /// two replicas with the same content but different merge history still
    /// agree.
    pub checksum: u32,
    pub meta_count: u32,
    pub active: bool,
    pub ready: bool,
    pub last_modified_secs: u64,
}

impl BucketInfo {
    pub fn empty() -> BucketInfo {
        BucketInfo::default()
    }

    /// Combine two replicas' info the way a merge step would: sums counts,
    /// keeps the higher checksum-breaking last-modified, and ORs the
    /// active/ready flags (a bucket active on any replica counts as active).
    pub fn merged_with(&self, other: &BucketInfo) -> BucketInfo {
        BucketInfo {
            doc_count: self.doc_count.max(other.doc_count),
            total_doc_size: self.total_doc_size.max(other.total_doc_size),
            checksum: self.checksum ^ other.checksum,
            meta_count: self.meta_count.max(other.meta_count),
            active: self.active || other.active,
            ready: self.ready || other.ready,
            last_modified_secs: self.last_modified_secs.max(other.last_modified_secs),
        }
    }
}

/// A single distributor-visible replica location: which content node holds
/// it, and that node's last reported [`BucketInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCopy {
    pub node_index: u16,
    pub info: BucketInfo,
}

/// Distributor-side bucket database value: a generation timestamp used to
/// order ownership changes, plus the known replica set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorBucketValue {
    pub gc_timestamp: u32,
    pub replicas: Vec<BucketCopy>,
}

#[cfg(test)]
#[path = "traits_test.rs"]
mod traits_test;
