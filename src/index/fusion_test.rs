use super::*;
use crate::index::dict::PageDict4Reader;
use crate::index::docidmap::{DocIdMapper, NO_DOC_ID};
use crate::index::field::FieldWriter;
use crate::index::types::NormalFeatures;

fn doc(doc_id: u32) -> DocIdAndFeatures {
    DocIdAndFeatures { doc_id, interleaved: None, normal: vec![NormalFeatures { element_id: 0, element_weight: 1, positions: vec![0] }] }
}

fn build_field(doc_id_limit: u32, words: &[(&str, &[u32])]) -> FieldFiles {
    let posting = PostingConfig { min_skip_docs: 4, min_chunk_docs: 1_000, ..Default::default() };
    let dict = DictConfig { page_bytes: 64, sp_per_ss: 2 };
    let bitvector = BitVectorConfig { min_vector_limit: 2 };
    let mut writer = FieldWriter::new(doc_id_limit, posting, dict, bitvector);
    for (word, docids) in words {
        writer.new_word(word);
        for &d in *docids {
            writer.add(doc(d));
        }
    }
    writer.close(1)
}

fn collect(files: &FieldFiles, doc_id_limit: u32) -> Vec<(u64, u32)> {
    let dict = PageDict4Reader::open(&files.dict_ss, &files.dict_sp, &files.dict_p).unwrap();
    let mut reader = FieldReader::open(&dict, &files.posting, doc_id_limit).unwrap();
    let mut out = Vec::new();
    while let Some((word_num, d)) = reader.read().unwrap() {
        out.push((word_num, d.doc_id));
    }
    out
}

#[test]
fn test_fuses_two_disjoint_inputs_into_one_field() {
    let files_a = build_field(10, &[("apple", &[0, 2]), ("cherry", &[4])]);
    let files_b = build_field(10, &[("banana", &[1]), ("cherry", &[3])]);

    let dict_a = PageDict4Reader::open(&files_a.dict_ss, &files_a.dict_sp, &files_a.dict_p).unwrap();
    let dict_b = PageDict4Reader::open(&files_b.dict_ss, &files_b.dict_sp, &files_b.dict_p).unwrap();

    // docids from input b are shifted by 5 into the fused docid space;
    // input a's docids pass through unchanged.
    let input_a = FusionInput {
        dict: dict_a,
        posting_bytes: &files_a.posting,
        doc_id_limit: 10,
        doc_id_mapper: DocIdMapper::identity(10),
    };
    let input_b = FusionInput {
        dict: dict_b,
        posting_bytes: &files_b.posting,
        doc_id_limit: 10,
        doc_id_mapper: DocIdMapper::new((0..10).map(|d| d + 5).collect()),
    };

    let mut merger = FieldMerger::new(
        "body",
        vec![input_a, input_b],
        15,
        FusionConfig::default(),
        PostingConfig { min_skip_docs: 4, min_chunk_docs: 1_000, ..Default::default() },
        DictConfig { page_bytes: 64, sp_per_ss: 2 },
        BitVectorConfig { min_vector_limit: 2 },
        false,
        FlushToken::new(),
        false,
    );

    let outcome = merger.run_to_completion().unwrap();
    assert_eq!(outcome, StepOutcome::Done);

    let result = merger.into_result().unwrap();
    let docs = collect(&result.files, 15);

    // apple (word 1): docids 0, 2 from input a
    // banana (word 2): docid 1 -> 6 from input b
    // cherry (word 3): docid 4 from a, docid 3 -> 8 from b, in docid order
    assert_eq!(docs, vec![(1, 0), (1, 2), (2, 6), (3, 4), (3, 8)]);
}

#[test]
fn test_dropped_docs_do_not_appear_in_fused_output() {
    let files_a = build_field(5, &[("only", &[0, 1, 2])]);
    let dict_a = PageDict4Reader::open(&files_a.dict_ss, &files_a.dict_sp, &files_a.dict_p).unwrap();

    let mut old2new = vec![0u32, NO_DOC_ID, 1, NO_DOC_ID, NO_DOC_ID];
    old2new[0] = 0;
    let input_a = FusionInput { dict: dict_a, posting_bytes: &files_a.posting, doc_id_limit: 5, doc_id_mapper: DocIdMapper::new(old2new) };

    let mut merger = FieldMerger::new(
        "body",
        vec![input_a],
        2,
        FusionConfig::default(),
        PostingConfig { min_skip_docs: 4, min_chunk_docs: 1_000, ..Default::default() },
        DictConfig { page_bytes: 64, sp_per_ss: 2 },
        BitVectorConfig { min_vector_limit: 2 },
        false,
        FlushToken::new(),
        false,
    );
    let outcome = merger.run_to_completion().unwrap();
    assert_eq!(outcome, StepOutcome::Done);
    let result = merger.into_result().unwrap();
    let docs = collect(&result.files, 2);
    assert_eq!(docs, vec![(1, 0), (1, 1)]);
}

#[test]
fn test_already_done_skips_straight_to_done() {
    let merger = FieldMerger::new(
        "body",
        Vec::new(),
        0,
        FusionConfig::default(),
        PostingConfig::default(),
        DictConfig::default(),
        BitVectorConfig::default(),
        false,
        FlushToken::new(),
        true,
    );
    assert!(merger.is_done());
}

#[test]
fn test_flush_token_cancels_in_flight_merge() {
    let files_a = build_field(10, &[("word", &[0, 1, 2])]);
    let dict_a = PageDict4Reader::open(&files_a.dict_ss, &files_a.dict_sp, &files_a.dict_p).unwrap();
    let input_a =
        FusionInput { dict: dict_a, posting_bytes: &files_a.posting, doc_id_limit: 10, doc_id_mapper: DocIdMapper::identity(10) };

    let token = FlushToken::new();
    token.request_stop();
    let mut merger = FieldMerger::new(
        "body",
        vec![input_a],
        10,
        FusionConfig::default(),
        PostingConfig::default(),
        DictConfig::default(),
        BitVectorConfig::default(),
        false,
        token,
        false,
    );
    let outcome = merger.run_to_completion().unwrap();
    assert_eq!(outcome, StepOutcome::Cancelled);
}
