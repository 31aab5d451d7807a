//! Tagged text-key file header shared by posting, dictionary, and bitvector
//! files: a `key=value` line per tag, padded with newlines to a 4 KiB
//! boundary so the body that follows always starts block-aligned.
//!
//! Every file carries at minimum `frozen`, `file_bit_size`, `format.0`,
//! `endian=big`, `desc`; posting and dictionary files add `format.1` naming
//! the inner feature codec (see `crate::index::posting`, `crate::index::dict`).

use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub const HEADER_ALIGN: usize = 4096;

#[derive(Clone, Debug, Default)]
pub struct Header {
    tags: BTreeMap<String, String>,
}

impl Header {
    pub fn new() -> Header {
        Header { tags: BTreeMap::new() }
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Header {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|s| s.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::InvalidHeader(format!("missing tag {:?}", key)))
    }

    pub fn require_u64(&self, key: &str) -> Result<u64> {
        self.require(key)?.parse().map_err(|_| Error::InvalidHeader(format!("tag {:?} is not an integer", key)))
    }

    pub fn require_tag(&self, key: &str, expect: &str) -> Result<()> {
        let got = self.require(key)?;
        if got != expect {
            return Err(Error::InvalidHeader(format!("tag {:?}: expected {:?}, got {:?}", key, expect, got)));
        }
        Ok(())
    }

    /// Serialize, padding with newlines to the next [`HEADER_ALIGN`]
    /// boundary. The first line is the header's own byte length so
    /// `decode` knows where the body starts without scanning for it.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = String::new();
        for (k, v) in &self.tags {
            body.push_str(k);
            body.push('=');
            body.push_str(v);
            body.push('\n');
        }
        // Reserve a fixed-width length line so its own encoding doesn't
        // change the total size it's describing.
        let len_line_width = 20; // "len=" + up to 16 digits, newline
        let unpadded = len_line_width + body.len();
        let total = ((unpadded + HEADER_ALIGN - 1) / HEADER_ALIGN) * HEADER_ALIGN;
        let len_line = format!("len={:0width$}\n", total, width = len_line_width - 5);

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(len_line.as_bytes());
        out.extend_from_slice(body.as_bytes());
        out.resize(total, b'\n');
        out
    }

    /// Parse the header at the start of `bytes`. Returns the header and the
    /// byte offset its body starts at.
    pub fn decode(bytes: &[u8]) -> Result<(Header, usize)> {
        if bytes.len() < HEADER_ALIGN {
            return Err(Error::PartialRead("header".into(), HEADER_ALIGN, bytes.len()));
        }
        let first_line_end = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::InvalidHeader("missing len= line".into()))?;
        let first_line = std::str::from_utf8(&bytes[..first_line_end])
            .map_err(|_| Error::InvalidHeader("header is not valid utf8".into()))?;
        let total: usize = first_line
            .strip_prefix("len=")
            .ok_or_else(|| Error::InvalidHeader("first header line is not len=".into()))?
            .trim()
            .parse()
            .map_err(|_| Error::InvalidHeader("len= value is not an integer".into()))?;
        if total > bytes.len() {
            return Err(Error::PartialRead("header".into(), total, bytes.len()));
        }
        if total < first_line_end + 1 {
            return Err(Error::InvalidHeader(format!("len={} is smaller than the header's own first line", total)));
        }
        let text = std::str::from_utf8(&bytes[first_line_end + 1..total])
            .map_err(|_| Error::InvalidHeader("header is not valid utf8".into()))?;
        let mut tags = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| Error::InvalidHeader(format!("malformed header line {:?}", line)))?;
            tags.insert(k.to_string(), v.to_string());
        }
        Ok((Header { tags }, total))
    }
}

#[cfg(test)]
#[path = "header_test.rs"]
mod header_test;
