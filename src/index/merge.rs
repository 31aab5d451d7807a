//! Tournament-style priority-queue merger shared by word-id renumbering and
//! posting-list merging during fusion (`crate::index::fusion`). A small
//! number of sources (typically a handful of input indexes) makes a linear
//! min-scan over the sources cheaper than maintaining a binary heap, which
//! is the "small-heap-limit" the source describes; this reader takes that
//! literally and always does the linear scan rather than switching
//! strategies above a threshold, since fusion fan-in is bounded by the
//! number of indexes being fused, never large.

/// One input stream to a merge: presents its current head key without
/// consuming it, and advances on `take`.
pub trait MergeSource {
    type Key: Ord + Clone;
    type Payload;

    /// The next key this source would emit, or `None` once exhausted.
    fn peek_key(&self) -> Option<&Self::Key>;

    /// Consume and return the current head. Must not be called when
    /// `peek_key` is `None`.
    fn take(&mut self) -> Result<Self::Payload, crate::error::Error>;
}

/// Receives merged `(key, source_index, payload)` triples. Multiple sources
/// tying on the same minimum key are all forwarded for one merge step,
/// letting the writer decide how to de-duplicate (e.g. renumbering every
/// input's occurrence of the same word to one output word id).
pub trait MergeWriter<K, P> {
    fn write(&mut self, key: &K, source_index: usize, payload: P);
}

/// Result of one bounded merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeProgress {
    /// At least one record remains; call `merge_chunk` again.
    Continue,
    /// Every source is exhausted.
    Done,
    /// The caller's cancellation check fired before the chunk completed.
    Cancelled,
}

/// Drives `sources` to completion in `chunk_size`-record steps, forwarding
/// every merged record to `writer` in ascending key order. `cancelled` is
/// polled once per record so a caller (the `FieldMerger` state machine) can
/// honor a flush token without this merger knowing about one directly.
pub struct TournamentMerge<S: MergeSource> {
    sources: Vec<S>,
}

impl<S: MergeSource> TournamentMerge<S> {
    pub fn new(sources: Vec<S>) -> TournamentMerge<S> {
        TournamentMerge { sources }
    }

    pub fn into_sources(self) -> Vec<S> {
        self.sources
    }

    /// Merge up to `chunk_size` distinct keys. A record count, not a key
    /// count, would technically match every ambiguity in "chunk size" the
    /// source leaves unstated; distinct keys is the simpler, still bounded,
    /// choice here.
    pub fn merge_chunk<W: MergeWriter<S::Key, S::Payload>>(
        &mut self,
        writer: &mut W,
        chunk_size: usize,
        mut cancelled: impl FnMut() -> bool,
    ) -> Result<MergeProgress, crate::error::Error> {
        for _ in 0..chunk_size {
            if cancelled() {
                return Ok(MergeProgress::Cancelled);
            }
            let min_key = match self.sources.iter().filter_map(|s| s.peek_key()).min().cloned() {
                Some(k) => k,
                None => return Ok(MergeProgress::Done),
            };
            for idx in 0..self.sources.len() {
                if self.sources[idx].peek_key() == Some(&min_key) {
                    let payload = self.sources[idx].take()?;
                    writer.write(&min_key, idx, payload);
                }
            }
        }
        if self.sources.iter().any(|s| s.peek_key().is_some()) {
            Ok(MergeProgress::Continue)
        } else {
            Ok(MergeProgress::Done)
        }
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;
