//! The on-disk inverted index: variable-byte and bit codecs, the
//! posting-list and dictionary file formats, per-field readers/writers, the
//! fusion (merge) state machine, and the query-time `DiskIndex` view.
//!
//! Module order below is leaves-first, matching spec.md §2's dependency
//! listing: codecs, then posting/dict file formats, then the per-field
//! reader/writer that couples them, then the merge primitives fusion is
//! built from, then the query-time view.

pub mod types;

pub mod skip;

pub mod posting;

pub mod dict;

pub mod bitvector;

pub mod docidmap;

pub mod field;

pub mod merge;

pub mod fusion;

pub mod diskindex;

pub use diskindex::{DiskIndex, FieldIndex, TermFieldInfo};
pub use field::{FieldFiles, FieldReader, FieldReaderEmpty, FieldReaderStripInfo, FieldWriter};
pub use fusion::{FlushToken, Fusion, FusionFieldResult, FusionInput, FusionReport};
pub use types::{DictEntry, DocIdAndFeatures, InterleavedFeatures, NormalFeatures, PostingListCounts, PostingSegment, WordSingleKey};
