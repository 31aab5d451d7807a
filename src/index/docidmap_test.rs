use super::*;

#[test]
fn test_map_dropped_doc_returns_none() {
    let mapper = DocIdMapper::new(vec![0, NO_DOC_ID, 1, 2]);
    assert_eq!(mapper.map(0), Some(0));
    assert_eq!(mapper.map(1), None);
    assert_eq!(mapper.map(2), Some(1));
    assert_eq!(mapper.map(3), Some(2));
}

#[test]
fn test_map_out_of_range_returns_none() {
    let mapper = DocIdMapper::new(vec![0, 1]);
    assert_eq!(mapper.map(5), None);
}

#[test]
fn test_identity_maps_every_doc_to_itself() {
    let mapper = DocIdMapper::identity(5);
    for i in 0..5 {
        assert_eq!(mapper.map(i), Some(i));
    }
}

#[test]
fn test_bytes_roundtrip() {
    let mapper = DocIdMapper::new(vec![3, NO_DOC_ID, 7, 0]);
    let bytes = mapper.to_bytes();
    let back = DocIdMapper::from_bytes(&bytes);
    assert_eq!(back.map(0), Some(3));
    assert_eq!(back.map(1), None);
    assert_eq!(back.map(2), Some(7));
    assert_eq!(back.map(3), Some(0));
}
