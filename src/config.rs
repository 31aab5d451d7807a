//! Per-subsystem configuration, loadable from TOML (teacher-style `Config`
//! structs with `const` defaults and a `Default` impl), see `robt_config.rs`
//! in the teacher crate for the pattern this follows.

use serde::{Deserialize, Serialize};

/// Tunables for the posting-list codec (`crate::index::posting`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingConfig {
    /// Below this doc-count, a word is written "rare": no skip tables.
    pub min_skip_docs: u32,
    /// At or above this doc-count, a word's posting list is chunked into
    /// multiple segments chained by a has-more bit.
    pub min_chunk_docs: u32,
    /// L1 stride: number of docs between level-1 skip entries.
    pub l1_stride: u32,
    /// Number of L(k-1) entries between each L(k) entry, k >= 2.
    pub skip_stride: u32,
    /// Use per-chunk dynamic exp-Golomb `k` for the last-docid delta
    /// (`Zc.5`) instead of a fixed `k` (`Zc.4`).
    pub dynamic_k: bool,
}

impl Default for PostingConfig {
    fn default() -> PostingConfig {
        PostingConfig {
            min_skip_docs: 1_000,
            min_chunk_docs: 128_000,
            l1_stride: 16,
            skip_stride: 8,
            dynamic_k: true,
        }
    }
}

/// Tunables for the bitvector side dictionary (`crate::index::bitvector`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BitVectorConfig {
    /// Minimum number of set docids before an in-memory candidate array is
    /// promoted into a dense bitvector; always `max(16, docIdLimit/64)`.
    pub min_vector_limit: u32,
}

impl Default for BitVectorConfig {
    fn default() -> BitVectorConfig {
        BitVectorConfig { min_vector_limit: 16 }
    }
}

/// Tunables for `PageDict4` pagination (`crate::index::dict`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DictConfig {
    /// SP/P page size in bytes.
    pub page_bytes: usize,
    /// Number of L3 (SP) entries collapsed per L6 (SS) entry.
    pub sp_per_ss: usize,
}

impl Default for DictConfig {
    fn default() -> DictConfig {
        DictConfig {
            page_bytes: 4096,
            sp_per_ss: 64,
        }
    }
}

/// Tunables for the fusion/merge pipeline (`crate::index::fusion`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Docs merged per `MERGE_POSTINGS` state-machine step.
    pub posting_chunk: usize,
    /// Word ids merged per `RENUMBER_WORD_IDS` state-machine step.
    pub word_id_chunk: usize,
    /// Small-heap limit for the tournament priority queue.
    pub heap_limit: usize,
    /// Upper bound (as a fraction of executor threads) on concurrently
    /// running field mergers.
    pub max_concurrent_fraction: f64,
}

impl Default for FusionConfig {
    fn default() -> FusionConfig {
        FusionConfig {
            posting_chunk: 50_000,
            word_id_chunk: 1_000_000,
            heap_limit: 4,
            max_concurrent_fraction: 0.5,
        }
    }
}

/// Tunables for `BucketManager` (`crate::bucket::manager`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketManagerConfig {
    /// Upper bound on milliseconds the worker thread sleeps waiting for
    /// full-bucket-info work before re-checking for interruption.
    pub worker_poll_millis: u64,
    /// Sub-stripe count exponent `s` for `StripedBTreeLockableMap`, so that
    /// there are `2^s` stripes.
    pub stripe_bits: u8,
}

impl Default for BucketManagerConfig {
    fn default() -> BucketManagerConfig {
        BucketManagerConfig {
            worker_poll_millis: 1_000,
            stripe_bits: 4,
        }
    }
}

/// Umbrella configuration for the whole crate, as would be loaded from a
/// single TOML file on node startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub posting: PostingConfig,
    pub bitvector: BitVectorConfig,
    pub dict: DictConfig,
    pub fusion: FusionConfig,
    pub bucket_manager: BucketManagerConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> crate::error::Result<Config> {
        toml::from_str(text)
            .map_err(|e| crate::error::Error::InvalidHeader(format!("config: {}", e)))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
