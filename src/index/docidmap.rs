//! `DocIdMapper`: remaps a source index's old docids to the fused output
//! index's new docids during fusion, carrying a sentinel for documents
//! dropped between indexes. Parallel to the word-id renumbering
//! (`old2new.dat`, see `crate::index::merge`) but per-document rather than
//! per-word, and consulted by `FieldReader`/`FieldMerger` while replaying a
//! source's posting lists.

/// Sentinel written in place of a doc id whose document did not survive
/// into the fused output.
pub const NO_DOC_ID: u32 = u32::MAX;

/// A dense old-docid → new-docid array for one source index, built once up
/// front by the fusion driver from the document-model layer's decision
/// about which documents survive and where they land.
#[derive(Clone, Debug)]
pub struct DocIdMapper {
    old2new: Vec<u32>,
}

impl DocIdMapper {
    /// `old2new[oldDocId]` is the new docid, or [`NO_DOC_ID`] if dropped.
    pub fn new(old2new: Vec<u32>) -> DocIdMapper {
        DocIdMapper { old2new }
    }

    /// Identity mapping over `[0, doc_id_limit)`, useful when a source
    /// index is known to be the sole input (no remapping needed).
    pub fn identity(doc_id_limit: u32) -> DocIdMapper {
        DocIdMapper { old2new: (0..doc_id_limit).collect() }
    }

    pub fn map(&self, old_doc_id: u32) -> Option<u32> {
        match self.old2new.get(old_doc_id as usize) {
            Some(&NO_DOC_ID) | None => None,
            Some(&new_id) => Some(new_id),
        }
    }

    pub fn len(&self) -> usize {
        self.old2new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old2new.is_empty()
    }

    /// Serialize as a flat big-endian `u32` array, the `old2new.dat`
    /// on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.old2new.len() * 4);
        for &v in &self.old2new {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> DocIdMapper {
        let old2new = bytes.chunks_exact(4).map(|c| u32::from_be_bytes(c.try_into().unwrap())).collect();
        DocIdMapper { old2new }
    }
}

#[cfg(test)]
#[path = "docidmap_test.rs"]
mod docidmap_test;
