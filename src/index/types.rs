//! Shared value types for the posting-list and dictionary codecs.

use serde::{Deserialize, Serialize};

/// Per-element word-position data ("normal features"); cheap to omit for
/// schemas that only need presence/frequency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalFeatures {
    pub element_id: u32,
    pub element_weight: u32,
    pub positions: Vec<u32>,
}

/// Compact per-document summary used when full positional data isn't
/// needed: field length and occurrence count, both capped at 16 bits on
/// disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleavedFeatures {
    pub field_length: u16,
    pub num_occs: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocIdAndFeatures {
    pub doc_id: u32,
    pub interleaved: Option<InterleavedFeatures>,
    pub normal: Vec<NormalFeatures>,
}

impl DocIdAndFeatures {
    pub fn new(doc_id: u32) -> DocIdAndFeatures {
        DocIdAndFeatures { doc_id, interleaved: None, normal: Vec::new() }
    }
}

/// One chunk of a chunked posting list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingSegment {
    pub num_docs: u32,
    pub bit_length: u64,
    pub last_doc: u32,
}

/// Dictionary-resident summary of a word's posting list: enough to open
/// and iterate it without touching the posting file's header again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingListCounts {
    pub num_docs: u32,
    pub bit_length: u64,
    pub segments: Vec<PostingSegment>,
}

impl PostingListCounts {
    pub fn is_chunked(&self) -> bool {
        self.segments.len() > 1
    }
}

/// Bitvector side-dictionary key: `(wordNum, numDocs)`, sorted by
/// `wordNum` in `boolocc.idx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WordSingleKey {
    pub word_num: u64,
    pub num_docs: u32,
}

/// Full dictionary record: `(word, wordNum, counts)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DictEntry {
    pub word: String,
    pub word_num: u64,
    pub counts: PostingListCounts,
}
