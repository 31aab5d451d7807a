//! Bucket identifiers and the "bucket key" transform that makes an in-order
//! B+tree traversal match an in-order binary-bucket-tree traversal.
//!
//! A [`BucketId`] is `(usedBits, rawId)`. `usedBits` lives in `[1, 58]`, and
//! only the lowest `usedBits` bits of `rawId` are meaningful. Converting to
//! a [`BucketId::to_key`] bit-reverses `rawId` and appends `usedBits` in the
//! low 6 bits, so a key ordering is the same as the binary tree's in-order
//! traversal: a parent's key is strictly less than any of its descendants'.

use std::cmp;

/// Used-bits occupies the 6 low bits of a bucket key, so `[1, 63]` is
/// representable; the domain further restricts it to `[1, 58]`.
pub const USED_BITS_FIELD: u32 = 6;
pub const MIN_USED_BITS: u32 = 1;
pub const MAX_USED_BITS: u32 = 58;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId {
    used_bits: u32,
    raw_id: u64,
}

impl BucketId {
    /// Construct a bucket id, masking `raw_id` down to its `used_bits` low
    /// bits (mirrors the source's tolerant constructor: callers routinely
    /// pass an id with garbage above the used-bits boundary).
    pub fn new(used_bits: u32, raw_id: u64) -> BucketId {
        debug_assert!((MIN_USED_BITS..=MAX_USED_BITS).contains(&used_bits));
        let masked = if used_bits >= 64 { raw_id } else { raw_id & ((1u64 << used_bits) - 1) };
        BucketId { used_bits, raw_id: masked }
    }

    pub fn used_bits(&self) -> u32 {
        self.used_bits
    }

    /// The raw id, masked to the used-bits boundary (i.e. `getId()`).
    pub fn raw_id(&self) -> u64 {
        self.raw_id
    }

    /// The bucket key: `reverse_bits(raw_id) | used_bits` with `used_bits`
    /// placed in the low 6 bits.
    pub fn to_key(&self) -> u64 {
        let reversed = self.raw_id.reverse_bits();
        (reversed & !((1u64 << USED_BITS_FIELD) - 1)) | self.used_bits as u64
    }

    /// Inverse of [`Self::to_key`].
    pub fn from_key(key: u64) -> BucketId {
        let used_bits = (key & ((1u64 << USED_BITS_FIELD) - 1)) as u32;
        let raw_id = (key & !((1u64 << USED_BITS_FIELD) - 1)).reverse_bits();
        BucketId::new(used_bits.max(MIN_USED_BITS), raw_id)
    }

    /// `self` contains `other` iff `self` is a prefix-bucket of `other`:
    /// fewer-or-equal used bits, and the raw ids agree on those bits.
    pub fn contains(&self, other: &BucketId) -> bool {
        if self.used_bits > other.used_bits {
            return false;
        }
        if self.used_bits >= 64 {
            return self.raw_id == other.raw_id;
        }
        let mask = (1u64 << self.used_bits) - 1;
        (self.raw_id & mask) == (other.raw_id & mask)
    }

    /// Number of leading bits shared between two bucket ids' raw ids, i.e.
    /// the depth at which the two paths through the binary tree diverge,
    /// clamped to each bucket's own used-bits.
    pub fn num_matching_bits(&self, other: &BucketId) -> u32 {
        let max_check = cmp::min(self.used_bits, other.used_bits);
        let mut n = 0;
        while n < max_check {
            if (self.raw_id >> n) & 1 != (other.raw_id >> n) & 1 {
                break;
            }
            n += 1;
        }
        n
    }
}

/// `next_parent_bit_seek_level` from the fused-tree parent-walk algorithm:
/// given the current search depth `bits`, the bucket the iterator landed
/// on (`candidate`), and the bucket being searched for (`target`), compute
/// the next bit-depth at which a parent could possibly exist.
///
/// If one bucket's path is a strict prefix of the other's, the next level
/// to check is one below the shallower of the two (there cannot be a
/// parent any shallower than that already visited candidate, but the
/// target might still have one immediately below it). Otherwise it's one
/// past the point where the two paths diverge.
pub fn next_parent_bit_seek_level(bits: u32, candidate: &BucketId, target: &BucketId) -> u32 {
    let matching = candidate.num_matching_bits(target);
    let shallower = cmp::min(candidate.used_bits(), target.used_bits());
    let next = if matching >= shallower { shallower + 1 } else { matching + 1 };
    cmp::max(next, bits + 1)
}

/// `getMinDiffBits`: minimum used-bits depth at which two buckets could
/// still share a common parent — used by `getAppropriateBucket`. Only
/// deepens past `min_bits` when the buckets' ids diverge inside
/// `[min_bits, min(usedBitsA, usedBitsB))`; never shrinks below `min_bits`.
pub fn min_diff_bits(min_bits: u32, a: &BucketId, b: &BucketId) -> u32 {
    let matching = a.num_matching_bits(b);
    if matching >= cmp::min(a.used_bits(), b.used_bits()) {
        min_bits
    } else {
        cmp::max(min_bits, matching + 1)
    }
}

#[cfg(test)]
#[path = "id_test.rs"]
mod id_test;
