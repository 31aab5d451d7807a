use super::*;
use crate::index::types::{PostingListCounts, PostingSegment};

fn entry(word: &str, word_num: u64, num_docs: u32) -> DictEntry {
    DictEntry {
        word: word.to_string(),
        word_num,
        counts: PostingListCounts {
            num_docs,
            bit_length: num_docs as u64 * 8,
            segments: vec![PostingSegment { num_docs, bit_length: num_docs as u64 * 8, last_doc: num_docs }],
        },
    }
}

fn build(words: &[&str], config: DictConfig) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut writer = PageDict4Writer::new(10_000, 1000, config);
    for (i, w) in words.iter().enumerate() {
        writer.add(entry(w, i as u64 + 1, (i as u32 + 1) * 3));
    }
    writer.finish()
}

#[test]
fn test_lookup_hit_returns_matching_counts() {
    let words = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
    let config = DictConfig { page_bytes: 40, sp_per_ss: 2 };
    let (ss, sp, p) = build(&words, config);
    let reader = PageDict4Reader::open(&ss, &sp, &p).unwrap();

    match reader.lookup("charlie").unwrap() {
        Lookup::Hit(e) => {
            assert_eq!(e.word, "charlie");
            assert_eq!(e.word_num, 3);
            assert_eq!(e.counts.num_docs, 9);
        }
        Lookup::Miss(_) => panic!("expected hit"),
    }
}

#[test]
fn test_lookup_miss_returns_successor() {
    let words = ["alpha", "bravo", "delta", "echo"];
    let config = DictConfig { page_bytes: 40, sp_per_ss: 2 };
    let (ss, sp, p) = build(&words, config);
    let reader = PageDict4Reader::open(&ss, &sp, &p).unwrap();

    match reader.lookup("charlie").unwrap() {
        Lookup::Hit(_) => panic!("expected miss"),
        Lookup::Miss(m) => assert_eq!(m.successor_word.as_deref(), Some("delta")),
    }
}

#[test]
fn test_lookup_is_monotone_by_offset_order() {
    let words = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let config = DictConfig { page_bytes: 10, sp_per_ss: 1 };
    let (ss, sp, p) = build(&words, config);
    let reader = PageDict4Reader::open(&ss, &sp, &p).unwrap();
    for w in &words {
        match reader.lookup(w).unwrap() {
            Lookup::Hit(e) => assert_eq!(&e.word, w),
            Lookup::Miss(_) => panic!("expected hit for {}", w),
        }
    }
}

#[test]
fn test_lookup_before_first_word_misses_to_first() {
    let words = ["mango", "nectarine", "orange"];
    let config = DictConfig { page_bytes: 40, sp_per_ss: 2 };
    let (ss, sp, p) = build(&words, config);
    let reader = PageDict4Reader::open(&ss, &sp, &p).unwrap();
    match reader.lookup("apple").unwrap() {
        Lookup::Hit(_) => panic!("expected miss"),
        Lookup::Miss(m) => assert_eq!(m.successor_word.as_deref(), Some("mango")),
    }
}

#[test]
fn test_headers_tag_format_and_frozen() {
    let words = ["alpha", "bravo"];
    let config = DictConfig::default();
    let (ss, sp, p) = build(&words, config);
    let (h, _) = Header::decode(&ss).unwrap();
    assert_eq!(h.require("format.0").unwrap(), "PageDict4SS.1");
    assert_eq!(h.require("frozen").unwrap(), "1");
    let (h, _) = Header::decode(&sp).unwrap();
    assert_eq!(h.require("format.0").unwrap(), "PageDict4SP.1");
    let (h, _) = Header::decode(&p).unwrap();
    assert_eq!(h.require("format.0").unwrap(), "PageDict4P.1");
}

#[test]
fn test_single_page_dictionary_roundtrips() {
    // Large page_bytes so everything lands on one P/SP/SS page.
    let words = ["apple", "mango", "zebra"];
    let config = DictConfig { page_bytes: 1_000_000, sp_per_ss: 1_000_000 };
    let (ss, sp, p) = build(&words, config);
    let reader = PageDict4Reader::open(&ss, &sp, &p).unwrap();
    assert_eq!(reader.num_words(), 1);
    match reader.lookup("mango").unwrap() {
        Lookup::Hit(e) => assert_eq!(e.word_num, 2),
        Lookup::Miss(_) => panic!("expected hit"),
    }
}
