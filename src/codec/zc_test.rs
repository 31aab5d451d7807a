use super::*;
use arbitrary::{Arbitrary, Unstructured};
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[test]
fn test_single_roundtrip() {
    for &v in &[0u32, 1, 127, 128, 16383, 16384, u32::MAX, u32::MAX - 1] {
        let mut buf = ZcBuf::new();
        buf.encode(v);
        let got = buf.decode();
        assert_eq!(got, v, "roundtrip failed for {}", v);
        assert_eq!(buf.pos(), buf.len());
    }
}

#[test]
fn test_encoded_len_matches_actual() {
    for &v in &[0u32, 126, 127, 128, 16383, 16384, 2_097_151, 2_097_152, u32::MAX] {
        let mut buf = ZcBuf::new();
        buf.encode(v);
        assert_eq!(buf.len(), ZcBuf::encoded_len(v));
    }
}

#[test]
fn test_sequence_roundtrip() {
    let seed: u128 = rand::random();
    println!("test_sequence_roundtrip seed={}", seed);
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());

    let values: Vec<u32> = (0..2000).map(|_| rng.gen()).collect();
    let mut buf = ZcBuf::new();
    for &v in &values {
        buf.encode(v);
    }
    let encoded_len: usize = values.iter().map(|&v| ZcBuf::encoded_len(v)).sum();
    assert_eq!(buf.len(), encoded_len);

    for &expect in &values {
        assert_eq!(buf.decode(), expect);
    }
    assert_eq!(buf.pos(), buf.len());
}

#[test]
fn test_padded_bytes_allow_overshoot_read() {
    let mut buf = ZcBuf::new();
    buf.encode(3);
    let padded = buf.as_padded_bytes();
    // decode_at with read-ahead up to 5 bytes must not panic even though
    // only 1 real byte was written.
    let (val, n) = ZcBuf::decode_at(&padded, 0);
    assert_eq!(val, 3);
    assert_eq!(n, 1);
}

#[test]
fn test_arbitrary_small_values() {
    let seed: u128 = rand::random();
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());
    let bytes: Vec<u8> = (0..256).map(|_| rng.gen()).collect();
    let mut u = Unstructured::new(&bytes);
    let mut buf = ZcBuf::new();
    let mut values = vec![];
    while let Ok(v) = u32::arbitrary(&mut u) {
        values.push(v);
        buf.encode(v);
        if values.len() >= 32 {
            break;
        }
    }
    for &expect in &values {
        assert_eq!(buf.decode(), expect);
    }
}
