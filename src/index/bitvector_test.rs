use super::*;

#[test]
fn test_dense_bitvector_set_get() {
    let mut v = DenseBitVector::new(100);
    v.set(1);
    v.set(50);
    v.set(99);
    assert!(v.get(1));
    assert!(v.get(50));
    assert!(v.get(99));
    assert!(!v.get(2));
    assert!(!v.get(0));
}

#[test]
fn test_candidate_promotes_past_limit() {
    let config = BitVectorConfig { min_vector_limit: 4 };
    let mut candidate = BitVectorCandidate::new(1024, &config);
    for id in 1..=4 {
        candidate.add(id);
        assert!(!candidate.is_promoted());
    }
    candidate.add(5);
    assert!(candidate.is_promoted());
    candidate.add(6);
    assert_eq!(candidate.num_docs(), 6);
}

#[test]
fn test_candidate_not_promoted_stays_none_on_into_dense() {
    let config = BitVectorConfig { min_vector_limit: 16 };
    let mut candidate = BitVectorCandidate::new(1024, &config);
    candidate.add(1);
    candidate.add(2);
    assert!(candidate.into_dense().is_none());
}

#[test]
fn test_bitvector_promotion_scenario() {
    // docIdLimit=1024, bitVectorLimit=16, docids 1..50: exactly one entry
    // with numDocs=50, bits 1..50 set in the backing bitmap.
    let config = BitVectorConfig { min_vector_limit: 16 };
    let mut candidate = BitVectorCandidate::new(1024, &config);
    for id in 1..=50 {
        candidate.add(id);
    }
    assert!(candidate.is_promoted());
    let dense = candidate.into_dense().unwrap();

    let mut writer = BitVectorFileWriter::new(1024);
    writer.add(7, dense);
    let (idx_bytes, bdat_bytes) = writer.finish();

    let dict = BitVectorDictionary::open(&idx_bytes, &bdat_bytes, 1024).unwrap();
    assert_eq!(dict.len(), 1);
    let found = dict.lookup(7).unwrap();
    for id in 1..=50 {
        assert!(found.get(id), "doc {} should be set", id);
    }
    assert!(!found.get(51));
    assert!(!found.get(0));
}

#[test]
fn test_lookup_miss_returns_none() {
    let config = BitVectorConfig { min_vector_limit: 2 };
    let mut candidate = BitVectorCandidate::new(256, &config);
    for id in 1..=10 {
        candidate.add(id);
    }
    let dense = candidate.into_dense().unwrap();
    let mut writer = BitVectorFileWriter::new(256);
    writer.add(3, dense);
    let (idx_bytes, bdat_bytes) = writer.finish();
    let dict = BitVectorDictionary::open(&idx_bytes, &bdat_bytes, 256).unwrap();
    assert!(dict.lookup(4).is_none());
}

#[test]
fn test_multiple_entries_sorted_by_word_num() {
    let config = BitVectorConfig { min_vector_limit: 2 };
    let mut writer = BitVectorFileWriter::new(128);
    for word_num in [1u64, 5, 9] {
        let mut candidate = BitVectorCandidate::new(128, &config);
        for id in 1..=5 {
            candidate.add(id * word_num as u32 % 100);
        }
        writer.add(word_num, candidate.into_dense().unwrap());
    }
    let (idx_bytes, bdat_bytes) = writer.finish();
    let dict = BitVectorDictionary::open(&idx_bytes, &bdat_bytes, 128).unwrap();
    assert_eq!(dict.len(), 3);
    assert!(dict.lookup(5).is_some());
    assert!(dict.lookup(7).is_none());
}
