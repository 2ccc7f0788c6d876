//! Object identity for the storage core.
//!
//! Provides the 20-byte [`ObjectId`], the streaming SHA-1 [`Hasher`](hasher::Hasher)
//! used for both object names and pack trailers, hex encoding/decoding, and
//! the 256-entry [`FanoutTable`](fanout::FanoutTable) shared by pack indexes.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use oid::ObjectId;

/// Length of a raw SHA-1 digest.
pub const DIGEST_LEN: usize = 20;

/// Length of a full hex object name.
pub const HEX_LEN: usize = DIGEST_LEN * 2;
