//! Dense bitvector side-dictionary for high-docfreq words: `boolocc.idx`
//! (sorted `WordSingleKey` entries) + `boolocc.bdat` (contiguous fixed-size
//! bitmaps). The in-memory candidate builder uses `croaring` the way the
//! teacher crate's `bitmaps::croaring` wrapper does — a compressed
//! accumulator that's converted to the on-disk dense byte layout only once
//! it's promoted, never serialized as roaring itself.

use croaring::Bitmap;

use crate::{config::BitVectorConfig, error::Result, index::types::WordSingleKey};

pub fn dense_bytes(doc_id_limit: u32) -> usize {
    ((doc_id_limit as usize) + 7) / 8
}

/// A fixed-size dense bitmap over `[0, docIdLimit)`, the on-disk
/// representation used by both `boolocc.bdat` entries and the promoted
/// candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseBitVector {
    bytes: Vec<u8>,
}

impl DenseBitVector {
    pub fn new(doc_id_limit: u32) -> DenseBitVector {
        DenseBitVector { bytes: vec![0u8; dense_bytes(doc_id_limit)] }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> DenseBitVector {
        DenseBitVector { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set(&mut self, doc_id: u32) {
        let (byte, bit) = (doc_id as usize / 8, doc_id % 8);
        self.bytes[byte] |= 1 << (7 - bit);
    }

    pub fn get(&self, doc_id: u32) -> bool {
        let (byte, bit) = (doc_id as usize / 8, doc_id % 8);
        match self.bytes.get(byte) {
            Some(b) => (b >> (7 - bit)) & 1 == 1,
            None => false,
        }
    }
}

/// Accumulates a word's docids while it's being written, promoting from a
/// sparse array into a dense bitvector once the count crosses
/// `max(16, docIdLimit/64)`. Kept sparse as long as possible since most
/// words never cross the threshold.
pub struct BitVectorCandidate {
    doc_id_limit: u32,
    limit: u32,
    array: Vec<u32>,
    promoted: Option<Bitmap>,
}

impl BitVectorCandidate {
    pub fn new(doc_id_limit: u32, config: &BitVectorConfig) -> BitVectorCandidate {
        let limit = config.min_vector_limit.max(doc_id_limit / 64);
        BitVectorCandidate { doc_id_limit, limit, array: Vec::new(), promoted: None }
    }

    pub fn add(&mut self, doc_id: u32) {
        if let Some(bm) = self.promoted.as_mut() {
            bm.add(doc_id);
            return;
        }
        self.array.push(doc_id);
        if self.array.len() as u32 > self.limit {
            let mut bm = Bitmap::create();
            bm.add_many(&self.array);
            self.promoted = Some(bm);
            self.array.clear();
        }
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted.is_some()
    }

    pub fn num_docs(&self) -> u32 {
        match &self.promoted {
            Some(bm) => bm.cardinality() as u32,
            None => self.array.len() as u32,
        }
    }

    /// Consume the candidate, returning the dense bitvector to write iff it
    /// was promoted.
    pub fn into_dense(self) -> Option<DenseBitVector> {
        self.promoted.map(|bm| {
            let mut dv = DenseBitVector::new(self.doc_id_limit);
            for doc_id in bm.iter() {
                dv.set(doc_id);
            }
            dv
        })
    }
}

/// Accumulates `(word_num, dense bitmap)` pairs in word-num order (the
/// order words are flushed in) and serializes the `boolocc.idx`/`boolocc.bdat`
/// pair on `finish`.
pub struct BitVectorFileWriter {
    doc_id_limit: u32,
    entries: Vec<WordSingleKey>,
    bitmaps: Vec<u8>,
}

impl BitVectorFileWriter {
    pub fn new(doc_id_limit: u32) -> BitVectorFileWriter {
        BitVectorFileWriter { doc_id_limit, entries: Vec::new(), bitmaps: Vec::new() }
    }

    pub fn add(&mut self, word_num: u64, vector: DenseBitVector) {
        debug_assert_eq!(vector.as_bytes().len(), dense_bytes(self.doc_id_limit));
        self.entries.push(WordSingleKey { word_num, num_docs: vector_set_bits(&vector) });
        self.bitmaps.extend_from_slice(vector.as_bytes());
    }

    /// Returns `(idx_bytes, bdat_bytes)`. `entries` must already be in
    /// ascending `word_num` order, matching the word-flush order of the
    /// field writer this backs.
    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        debug_assert!(self.entries.windows(2).all(|w| w[0].word_num < w[1].word_num));
        let mut idx = Vec::with_capacity(self.entries.len() * 12);
        for e in &self.entries {
            idx.extend_from_slice(&e.word_num.to_be_bytes());
            idx.extend_from_slice(&e.num_docs.to_be_bytes());
        }
        (idx, self.bitmaps)
    }
}

fn vector_set_bits(vector: &DenseBitVector) -> u32 {
    vector.as_bytes().iter().map(|b| b.count_ones()).sum()
}

const WORD_SINGLE_KEY_BYTES: usize = 12;

/// Read-side view over a parsed `boolocc.idx` and the raw `boolocc.bdat`
/// bytes. `lookup` binary-searches the in-memory sorted entries, then reads
/// the matching slot directly out of the bdat buffer.
pub struct BitVectorDictionary<'a> {
    doc_id_limit: u32,
    entries: Vec<WordSingleKey>,
    bdat: &'a [u8],
}

impl<'a> BitVectorDictionary<'a> {
    pub fn open(idx_bytes: &[u8], bdat: &'a [u8], doc_id_limit: u32) -> Result<BitVectorDictionary<'a>> {
        if idx_bytes.len() % WORD_SINGLE_KEY_BYTES != 0 {
            return Err(crate::error::Error::InvalidHeader(format!(
                "boolocc.idx length {} is not a multiple of {}",
                idx_bytes.len(),
                WORD_SINGLE_KEY_BYTES
            )));
        }
        let n = idx_bytes.len() / WORD_SINGLE_KEY_BYTES;
        let mut entries = Vec::with_capacity(n);
        for chunk in idx_bytes.chunks_exact(WORD_SINGLE_KEY_BYTES) {
            let word_num = u64::from_be_bytes(chunk[0..8].try_into().unwrap());
            let num_docs = u32::from_be_bytes(chunk[8..12].try_into().unwrap());
            entries.push(WordSingleKey { word_num, num_docs });
        }
        Ok(BitVectorDictionary { doc_id_limit, entries, bdat })
    }

    pub fn lookup(&self, word_num: u64) -> Option<DenseBitVector> {
        let idx = self.entries.binary_search_by_key(&word_num, |e| e.word_num).ok()?;
        let vector_bytes = dense_bytes(self.doc_id_limit);
        let offset = idx * vector_bytes;
        Some(DenseBitVector::from_bytes(self.bdat[offset..offset + vector_bytes].to_vec()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "bitvector_test.rs"]
mod bitvector_test;
