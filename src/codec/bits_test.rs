use super::*;
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[test]
fn test_write_read_bits_various_widths() {
    let mut w = BitWriter::new();
    w.write_bits(0b101, 3);
    w.write_bits(0xff, 8);
    w.write_bits(0, 5);
    w.write_bits(0xdead_beef, 32);
    let bytes = w.into_bytes();

    let mut r = BitReader::new(&bytes);
    assert_eq!(r.read_bits(3), 0b101);
    assert_eq!(r.read_bits(8), 0xff);
    assert_eq!(r.read_bits(5), 0);
    assert_eq!(r.read_bits(32), 0xdead_beef);
}

#[test]
fn test_exp_golomb_roundtrip_exhaustive_small() {
    for k in 0u8..=8 {
        for v in 0u64..300 {
            let mut w = BitWriter::new();
            w.encode_exp_golomb(v, k);
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            let got = r.decode_exp_golomb(k);
            assert_eq!(got, v, "k={} v={}", k, v);
        }
    }
}

#[test]
fn test_exp_golomb_roundtrip_random_u32_range() {
    let seed: u128 = rand::random();
    println!("test_exp_golomb_roundtrip_random_u32_range seed={}", seed);
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());
    for k in [0u8, 1, 3, 7, 15, 20, 31] {
        for _ in 0..200 {
            let v: u64 = rng.gen::<u32>() as u64;
            let mut w = BitWriter::new();
            w.encode_exp_golomb(v, k);
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            assert_eq!(r.decode_exp_golomb(k), v);
        }
    }
}

#[test]
fn test_sequence_of_mixed_fields() {
    let mut w = BitWriter::new();
    let fields: Vec<(u64, u8)> = vec![(5, 4), (1000, 12), (0, 1), (u32::MAX as u64, 32)];
    for &(v, k) in &fields {
        w.encode_exp_golomb(v, k);
    }
    let bytes = w.into_bytes();
    let mut r = BitReader::new(&bytes);
    for &(v, k) in &fields {
        assert_eq!(r.decode_exp_golomb(k), v);
    }
}

#[test]
fn test_small_align() {
    let mut w = BitWriter::new();
    w.write_bits(0b1, 1);
    w.small_align(8);
    assert_eq!(w.bit_len(), 8);
    w.write_bits(0b11, 2);
    w.small_align(16);
    assert_eq!(w.bit_len(), 16);
}

#[test]
fn test_pad_bits_at_least_128_after_end() {
    let mut w = BitWriter::new();
    w.write_bits(0xff, 8);
    let before = w.bit_len();
    w.pad_bits(128);
    assert_eq!(w.bit_len(), before + 128);
    // Padding must be all-zero so an unchecked decoder read-ahead is safe.
    let bytes = w.into_bytes();
    assert!(bytes[1..].iter().all(|&b| b == 0));
}

#[test]
fn test_align_direct_io() {
    let mut w = BitWriter::new();
    w.write_bits(0xabcd, 16);
    w.align_direct_io(512);
    assert_eq!(w.bytes().len() % 512, 0);
}
