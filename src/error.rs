//! Crate-wide error type.
//!
//! Low level codec routines are infallible given pre-validated input (out of
//! range conditions trip a `debug_assert!` rather than returning `Err`); only
//! file I/O, header/format validation and the bucket-protocol-facing layers
//! return `Result`.

use std::{fmt, io, result};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Opening, reading or writing a file failed.
    IoError(String, io::Error),
    /// A file existed but did not contain the expected tagged header, or a
    /// header field carried an unexpected value (wrong endian, wrong magic,
    /// wrong `format.0`/`format.1`).
    InvalidHeader(String),
    /// A read encountered fewer bytes than the header's `fileBitSize` or
    /// `numWords` promised.
    PartialRead(String, usize, usize),
    /// A bit/byte codec was asked to decode something structurally
    /// impossible (used only where the caller cannot have pre-validated).
    CorruptEncoding(String),
    /// A dictionary or posting-list lookup found the word missing.
    NotFound(String),
    /// A fusion field-merge failed or was cancelled.
    FusionFailed(String),
    /// A fusion field-merge's flush token requested a stop.
    FusionCancelled,
    /// A put/update/remove arrived with a timestamp not newer than the
    /// bucket's recorded `lastModified`.
    StaleTimestamp { incoming: u64, last_modified: u64 },
    /// A `requestBucketInfo` arrived while cluster state was still
    /// transitioning, or the requester's distribution hash didn't match.
    Rejected(String),
    /// Caller passed bucket used-bits outside `[1, 58]`, or similar
    /// precondition violation on a public API boundary.
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(ctx, err) => write!(f, "io error in {}: {}", ctx, err),
            Error::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
            Error::PartialRead(ctx, want, got) => {
                write!(f, "partial read in {}: wanted {} bytes, got {}", ctx, want, got)
            }
            Error::CorruptEncoding(msg) => write!(f, "corrupt encoding: {}", msg),
            Error::NotFound(word) => write!(f, "not found: {}", word),
            Error::FusionFailed(msg) => write!(f, "fusion failed: {}", msg),
            Error::FusionCancelled => write!(f, "fusion cancelled by flush token"),
            Error::StaleTimestamp { incoming, last_modified } => write!(
                f,
                "stale timestamp: incoming {} <= last-modified {}",
                incoming, last_modified
            ),
            Error::Rejected(msg) => write!(f, "rejected: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub(crate) fn io(ctx: impl Into<String>, err: io::Error) -> Error {
        Error::IoError(ctx.into(), err)
    }
}
