//! Multi-level skip table used by [`crate::index::posting`] to let a reader
//! seek to a target docId without decoding every entry in between.
//!
//! The source format hard-codes four levels (L1-L4) with fixed geometric
//! strides; here the level count and per-level stride are both runtime
//! parameters (`l1_stride`, then `skip_stride` for every level above L1),
//! collapsing what would otherwise be four near-identical structs/loops
//! into one generic ladder. A four-level build with the documented
//! strides (16, 8, 8, 8) is exactly `SkipLadder::build(docids, 16, 8, 4)`.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipEntry {
    pub doc_id: u32,
    /// Bit offset into the chunk-local docid delta stream, positioned right
    /// after `doc_id` has been decoded — i.e. where decoding the *next* doc
    /// resumes.
    pub docid_bit_pos: u64,
    /// Bit offset into the chunk-local feature stream, same "right after"
    /// convention; `None` if the field carries no features.
    pub feature_bit_pos: Option<u64>,
    /// 0-based position of `doc_id` within its chunk's full checkpoint
    /// list, used to recompute how many docs remain in the chunk once a
    /// reader resumes decoding from this entry.
    pub doc_index: u32,
    /// Index into the level below (unused, always 0, for L1).
    pub lower_level_index: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SkipLevel {
    pub entries: Vec<SkipEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct SkipLadder {
    pub levels: Vec<SkipLevel>,
}

impl SkipLadder {
    /// Build a ladder over `checkpoints`, a list of `(doc_id, docid_bit_pos,
    /// feature_bit_pos)` recorded once per raw posting (every doc), taking
    /// every `l1_stride`-th one for L1 and then thinning by `skip_stride`
    /// for each additional level, for `levels` levels total. `checkpoints`
    /// must be indexed in chunk doc order — its index doubles as `doc_index`.
    pub fn build(
        checkpoints: &[(u32, u64, Option<u64>)],
        l1_stride: u32,
        skip_stride: u32,
        levels: u32,
    ) -> SkipLadder {
        let mut ladder = SkipLadder { levels: Vec::new() };
        if checkpoints.is_empty() || levels == 0 {
            return ladder;
        }

        let mut l1 = SkipLevel::default();
        let mut i = (l1_stride as usize).saturating_sub(1);
        while i < checkpoints.len() {
            let (doc_id, docid_bit_pos, feature_bit_pos) = checkpoints[i];
            l1.entries.push(SkipEntry {
                doc_id,
                docid_bit_pos,
                feature_bit_pos,
                doc_index: i as u32,
                lower_level_index: 0,
            });
            i += l1_stride as usize;
        }
        ladder.levels.push(l1);

        for _ in 1..levels {
            let below = ladder.levels.last().unwrap();
            if below.entries.len() < skip_stride as usize {
                break;
            }
            let mut level = SkipLevel::default();
            let mut j = (skip_stride as usize).saturating_sub(1);
            while j < below.entries.len() {
                let e = below.entries[j];
                level.entries.push(SkipEntry { lower_level_index: j as u32, ..e });
                j += skip_stride as usize;
            }
            ladder.levels.push(level);
        }
        ladder
    }

    /// Find the deepest L1 entry with `doc_id < target` — the point a
    /// sequential scan should resume from to reach `target`. Each level
    /// narrows the search range for the level below via its recorded
    /// `lower_level_index`, so the L1 binary search only has to cover one
    /// `skip_stride` window instead of the whole table.
    pub fn seek(&self, target: u32) -> Option<SkipEntry> {
        let top = self.levels.len().checked_sub(1)?;
        // Index into the CURRENT level of the rightmost entry known to
        // precede `target`, narrowed one level at a time via
        // `lower_level_index`; starts unconstrained (whole top level).
        let mut floor_idx: Option<usize> = None;
        for depth in (0..=top).rev() {
            let level = &self.levels[depth];
            let window_start = match floor_idx {
                Some(idx) => level.entries[idx].lower_level_index as usize,
                None => 0,
            };
            let advance = level.entries[window_start..].partition_point(|e| e.doc_id < target);
            floor_idx = if advance == 0 { None } else { Some(window_start + advance - 1) };
            if depth == 0 {
                return floor_idx.map(|idx| level.entries[idx]);
            }
            // If no entry at this level precedes target, the level below
            // is searched from its own beginning (window_start == 0 there).
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
#[path = "skip_test.rs"]
mod skip_test;
