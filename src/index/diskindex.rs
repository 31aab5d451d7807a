//! `FieldIndex`/`DiskIndex`: the query-time view over a field's fused
//! dictionary, posting, and bitvector files. This is a read-only navigation
//! surface for a query planner — no ranking or blueprint logic lives here,
//! matching spec.md §1's exclusion of that layer.

use std::collections::HashMap;

use crate::{
    error::Result,
    index::{
        bitvector::{BitVectorDictionary, DenseBitVector},
        dict::{Lookup, PageDict4Reader},
        field::{FieldFiles, FieldReader},
        types::DocIdAndFeatures,
    },
};

/// The `DiskTermBlueprint`-style hints a query planner wants for a term:
/// how many docs carry it, and how large its posting entry is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermFieldInfo {
    pub doc_freq: u32,
    pub bit_length: u64,
}

/// One field's on-disk data, owned outright rather than memory-mapped —
/// this crate doesn't implement the file I/O layer (spec.md §1 names it as
/// a separate collaborator), so `FieldFiles` bytes are kept resident and
/// readers are built from them on demand.
pub struct FieldIndex {
    name: String,
    doc_id_limit: u32,
    posting: Vec<u8>,
    dict_ss: Vec<u8>,
    dict_sp: Vec<u8>,
    dict_p: Vec<u8>,
    bitvector_idx: Vec<u8>,
    bitvector_bdat: Vec<u8>,
}

impl FieldIndex {
    pub fn open(name: impl Into<String>, files: FieldFiles, doc_id_limit: u32) -> FieldIndex {
        FieldIndex {
            name: name.into(),
            doc_id_limit,
            posting: files.posting,
            dict_ss: files.dict_ss,
            dict_sp: files.dict_sp,
            dict_p: files.dict_p,
            bitvector_idx: files.bitvector_idx,
            bitvector_bdat: files.bitvector_bdat,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn dict(&self) -> Result<PageDict4Reader> {
        PageDict4Reader::open(&self.dict_ss, &self.dict_sp, &self.dict_p)
    }

    pub fn num_words(&self) -> Result<u64> {
        Ok(self.dict()?.num_words())
    }

    pub fn term_field_info(&self, word: &str) -> Result<Option<TermFieldInfo>> {
        match self.dict()?.lookup(word)? {
            Lookup::Hit(entry) => Ok(Some(TermFieldInfo { doc_freq: entry.counts.num_docs, bit_length: entry.counts.bit_length })),
            Lookup::Miss(_) => Ok(None),
        }
    }

    /// All docs carrying `word`, or an empty vec if it's absent.
    ///
    /// The dictionary doesn't record a per-word posting-stream offset —
    /// `FieldReader` chains word-to-word by tracking the previous word's
    /// `Zc4PostingReader::bitpos()` instead (see `index::field`) — so a
    /// point lookup still costs a forward scan over every word at or
    /// before `word` in posting order. Acceptable for this read-only
    /// navigation surface; a latency-sensitive query path would want the
    /// dictionary to carry the offset directly.
    pub fn term_postings(&self, word: &str) -> Result<Vec<DocIdAndFeatures>> {
        let dict = self.dict()?;
        let target = match dict.lookup(word)? {
            Lookup::Hit(entry) => entry.word_num,
            Lookup::Miss(_) => return Ok(Vec::new()),
        };
        let mut reader = FieldReader::open(&dict, &self.posting, self.doc_id_limit)?;
        let mut out = Vec::new();
        while let Some((word_num, doc)) = reader.read()? {
            if word_num == target {
                out.push(doc);
            } else if word_num > target {
                break;
            }
        }
        Ok(out)
    }

    /// The dense bitvector side entry for `word`, if the word was ever
    /// promoted into the bitvector dictionary during fusion/writing.
    pub fn term_bitvector(&self, word: &str) -> Result<Option<DenseBitVector>> {
        if self.bitvector_idx.is_empty() {
            return Ok(None);
        }
        let word_num = match self.dict()?.lookup(word)? {
            Lookup::Hit(entry) => entry.word_num,
            Lookup::Miss(_) => return Ok(None),
        };
        let bv = BitVectorDictionary::open(&self.bitvector_idx, &self.bitvector_bdat, self.doc_id_limit)?;
        Ok(bv.lookup(word_num))
    }
}

/// Owns every field's `FieldIndex` for one disk index. Fields remain alive
/// until the `DiskIndex` is dropped, matching spec.md's ownership note.
pub struct DiskIndex {
    fields: HashMap<String, FieldIndex>,
}

impl Default for DiskIndex {
    fn default() -> DiskIndex {
        DiskIndex::new()
    }
}

impl DiskIndex {
    pub fn new() -> DiskIndex {
        DiskIndex { fields: HashMap::new() }
    }

    pub fn insert_field(&mut self, field: FieldIndex) {
        self.fields.insert(field.name.clone(), field);
    }

    pub fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn term_field_info(&self, field: &str, word: &str) -> Result<Option<TermFieldInfo>> {
        match self.field(field) {
            Some(f) => f.term_field_info(word),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "diskindex_test.rs"]
mod diskindex_test;
