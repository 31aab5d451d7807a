//! `FieldWriter`/`FieldReader`: the per-field word stream that couples a
//! [`PageDict4Writer`]/[`PageDict4Reader`] with a
//! [`Zc4PostingWriter`]/[`Zc4PostingReader`] and the bitvector side
//! dictionary, plus the two reader variants fusion needs when a field's
//! schema changes between source indexes.

use std::collections::HashMap;

use crate::{
    config::{BitVectorConfig, DictConfig, PostingConfig},
    error::{Error, Result},
    index::{
        bitvector::{BitVectorCandidate, BitVectorFileWriter},
        dict::{DictEntry, PageDict4Reader, PageDict4Writer},
        posting::{Zc4PostingReader, Zc4PostingWriter},
        types::{DocIdAndFeatures, InterleavedFeatures},
    },
};

/// The three files a field's posting data, dictionary, and bitvector side
/// index serialize to.
pub struct FieldFiles {
    pub posting: Vec<u8>,
    pub dict_ss: Vec<u8>,
    pub dict_sp: Vec<u8>,
    pub dict_p: Vec<u8>,
    pub bitvector_idx: Vec<u8>,
    pub bitvector_bdat: Vec<u8>,
}

/// Sequential per-field writer. `new_word` closes out whatever word was
/// open and starts the next; `add` appends a doc to the currently open
/// word. Word numbers are assigned in the order words are opened, starting
/// at 1 (0 is reserved, matching the teacher's 1-based id conventions
/// elsewhere, e.g. `BucketId`'s reserved raw ids).
pub struct FieldWriter {
    doc_id_limit: u32,
    bitvector_config: BitVectorConfig,
    posting: Zc4PostingWriter,
    dict: PageDict4Writer,
    bitvector: BitVectorFileWriter,
    next_word_num: u64,
    current: Option<(String, u64, BitVectorCandidate)>,
}

impl FieldWriter {
    pub fn new(
        doc_id_limit: u32,
        posting_config: PostingConfig,
        dict_config: DictConfig,
        bitvector_config: BitVectorConfig,
    ) -> FieldWriter {
        let min_chunk_docs = posting_config.min_chunk_docs;
        FieldWriter {
            doc_id_limit,
            bitvector_config,
            posting: Zc4PostingWriter::new(doc_id_limit, posting_config),
            dict: PageDict4Writer::new(doc_id_limit, min_chunk_docs, dict_config),
            bitvector: BitVectorFileWriter::new(doc_id_limit),
            next_word_num: 1,
            current: None,
        }
    }

    /// Flush the currently open word (if any) and open `word`. Words must
    /// be opened in ascending lexicographic order.
    pub fn new_word(&mut self, word: &str) {
        self.flush_current();
        let word_num = self.next_word_num;
        self.next_word_num += 1;
        let candidate = BitVectorCandidate::new(self.doc_id_limit, &self.bitvector_config);
        self.current = Some((word.to_string(), word_num, candidate));
    }

    /// Append a doc to the currently open word.
    pub fn add(&mut self, features: DocIdAndFeatures) {
        let (_, _, candidate) = self.current.as_mut().expect("add called with no open word");
        candidate.add(features.doc_id);
        self.posting.add(features);
    }

    fn flush_current(&mut self) {
        if let Some((word, word_num, candidate)) = self.current.take() {
            let counts = self.posting.flush_word();
            if let Some(dense) = candidate.into_dense() {
                self.bitvector.add(word_num, dense);
            }
            self.dict.add(DictEntry { word, word_num, counts });
        }
    }

    pub fn close(mut self, direct_io_block: usize) -> FieldFiles {
        self.flush_current();
        let posting = self.posting.close(direct_io_block);
        let (dict_ss, dict_sp, dict_p) = self.dict.finish();
        let (bitvector_idx, bitvector_bdat) = self.bitvector.finish();
        FieldFiles { posting, dict_ss, dict_sp, dict_p, bitvector_idx, bitvector_bdat }
    }
}

/// Sequential field reader: couples a dictionary word scan with the
/// posting stream, yielding `(wordNum, docIdAndFeatures)` pairs in
/// `(word, docId)` order.
pub struct FieldReader<'a> {
    words: std::vec::IntoIter<DictEntry>,
    current: Option<(u64, Zc4PostingReader<'a>, u32)>,
    posting_bytes: &'a [u8],
    doc_id_limit: u32,
    next_bitpos: u64,
}

impl<'a> FieldReader<'a> {
    pub fn open(dict: &PageDict4Reader, posting_bytes: &'a [u8], doc_id_limit: u32) -> Result<FieldReader<'a>> {
        let words = dict.iter_words()?;
        Ok(FieldReader { words: words.into_iter(), current: None, posting_bytes, doc_id_limit, next_bitpos: 0 })
    }

    /// Yield the next `(wordNum, docIdAndFeatures)`, or `None` once every
    /// word in the field has been read.
    pub fn read(&mut self) -> Result<Option<(u64, DocIdAndFeatures)>> {
        loop {
            if let Some((word_num, reader, remaining)) = self.current.as_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    let wn = *word_num;
                    let doc = reader
                        .next()?
                        .ok_or_else(|| Error::CorruptEncoding("word ended before its declared doc count".into()))?;
                    return Ok(Some((wn, doc)));
                }
                self.next_bitpos = reader.bitpos();
                self.current = None;
            }
            match self.words.next() {
                None => return Ok(None),
                Some(entry) => {
                    if entry.counts.num_docs == 0 {
                        continue;
                    }
                    let reader = Zc4PostingReader::open_at(self.posting_bytes, self.doc_id_limit, self.next_bitpos)?;
                    self.current = Some((entry.word_num, reader, entry.counts.num_docs));
                }
            }
        }
    }
}

/// A field reader for a field that no longer exists in the fused schema:
/// drops all its data by never yielding anything.
#[derive(Default)]
pub struct FieldReaderEmpty;

impl FieldReaderEmpty {
    pub fn read(&mut self) -> Result<Option<(u64, DocIdAndFeatures)>> {
        Ok(None)
    }
}

/// Wraps a [`FieldReader`] to remap element ids between old and new schema
/// collection types and, when requested, regenerate interleaved features
/// (field length, occurrence count) from the normal per-position features.
/// Regeneration needs every occurrence of an element seen before it can
/// report a final count, so `new` eagerly drains the inner reader in a
/// first pass before replaying remapped records from `read`.
pub struct FieldReaderStripInfo {
    source: Vec<(u64, DocIdAndFeatures)>,
    pos: usize,
    regenerate_interleaved: bool,
    element_totals: HashMap<(u64, u32), (u16, u16)>,
}

impl FieldReaderStripInfo {
    pub fn new(
        mut inner: FieldReader,
        remap_element: impl Fn(u32) -> u32,
        regenerate_interleaved: bool,
    ) -> Result<FieldReaderStripInfo> {
        let mut source = Vec::new();
        while let Some((word_num, mut doc)) = inner.read()? {
            for nf in doc.normal.iter_mut() {
                nf.element_id = remap_element(nf.element_id);
            }
            source.push((word_num, doc));
        }

        let mut element_totals: HashMap<(u64, u32), (u32, u32)> = HashMap::new();
        if regenerate_interleaved {
            for (word_num, doc) in &source {
                for nf in &doc.normal {
                    let key = (*word_num, nf.element_id);
                    let entry = element_totals.entry(key).or_insert((0, 0));
                    // Position count stands in for field length when the
                    // original element length isn't available at this
                    // layer; both are summed across duplicate occurrences
                    // the same way.
                    entry.0 += nf.positions.len() as u32;
                    entry.1 += 1;
                }
            }
        }

        let element_totals =
            element_totals.into_iter().map(|(k, (len, occs))| (k, (len.min(u16::MAX as u32) as u16, occs.min(u16::MAX as u32) as u16))).collect();

        Ok(FieldReaderStripInfo { source, pos: 0, regenerate_interleaved, element_totals })
    }

    pub fn read(&mut self) -> Result<Option<(u64, DocIdAndFeatures)>> {
        if self.pos >= self.source.len() {
            return Ok(None);
        }
        let (word_num, mut doc) = self.source[self.pos].clone();
        self.pos += 1;
        if self.regenerate_interleaved {
            if let Some(nf) = doc.normal.first() {
                if let Some(&(field_length, num_occs)) = self.element_totals.get(&(word_num, nf.element_id)) {
                    doc.interleaved = Some(InterleavedFeatures { field_length, num_occs });
                }
            }
        }
        Ok(Some((word_num, doc)))
    }
}

#[cfg(test)]
#[path = "field_test.rs"]
mod field_test;
