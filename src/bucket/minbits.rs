//! Tracks the minimum used-bits value across every bucket a content node
//! holds. Distribution relies on no bucket in the cluster using fewer split
//! bits than this minimum; a decrease must be reported upward so the
//! cluster controller can keep its distribution model in sync.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bucket::id::MAX_USED_BITS;

pub struct MinimumUsedBitsTracker {
    min_bits: AtomicU32,
}

impl MinimumUsedBitsTracker {
    pub fn new() -> MinimumUsedBitsTracker {
        MinimumUsedBitsTracker { min_bits: AtomicU32::new(MAX_USED_BITS) }
    }

    pub fn current(&self) -> u32 {
        self.min_bits.load(Ordering::Acquire)
    }

    /// Record that a bucket with `used_bits` now exists. Returns `true` if
    /// this lowered the tracked minimum, meaning the caller must republish
    /// node state.
    pub fn update(&self, used_bits: u32) -> bool {
        let mut cur = self.min_bits.load(Ordering::Acquire);
        loop {
            if used_bits >= cur {
                return false;
            }
            match self.min_bits.compare_exchange_weak(cur, used_bits, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }
}

impl Default for MinimumUsedBitsTracker {
    fn default() -> MinimumUsedBitsTracker {
        MinimumUsedBitsTracker::new()
    }
}
