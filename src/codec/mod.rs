//! Bit- and byte-level codecs used by the posting-list and dictionary file
//! formats: [`zc`] is the zigzag-free variable-byte codec for docid/skip
//! deltas, [`bits`] is the big-endian bit stream used for packed features
//! and exponential-Golomb coding.

pub mod bits;
pub mod header;
pub mod zc;
