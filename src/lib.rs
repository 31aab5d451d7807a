//! Storage engine for a search cluster's content node: an on-disk
//! inverted-index format (variable-byte and bit codecs, posting lists,
//! paged dictionaries, per-field fusion) under [`index`], and a concurrent
//! bucket database (bucket identifiers, a lock-free B+tree keyed by bucket,
//! striped locking, and the request-routing manager built on top) under
//! [`bucket`].
//!
//! [`config`] holds every subsystem's TOML-loadable tunables; [`error`] is
//! the crate-wide error type; [`codec`] holds the low-level bit/byte codecs
//! the index file formats are built from.

pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod bucket;

pub use error::{Error, Result};
