//! Pack format, delta engine and the packed object backend.
//!
//! A pack is the container objects travel in between repositories and the
//! form they take once stored compactly on disk:
//!
//! ```text
//! "PACK" | version (u32 BE = 2) | count (u32 BE)
//! record * count
//! SHA-1 of everything above (20 bytes)
//! ```
//!
//! Records are either whole objects or deltas against another object, named
//! by OID (ref-delta) or by a backwards offset in the same pack (ofs-delta).
//! [`write::Writer`] produces packs, [`unpack::Unpacker`] consumes them into
//! an object store, [`indexer::Indexer`] installs them on disk together with
//! a [`index::PackIndex`], and [`pack::PackFile`] serves reads from such an
//! installed pair.

pub mod compress;
pub mod delta;
pub mod entry;
pub mod index;
pub mod indexer;
pub mod pack;
pub mod reader;
pub mod store;
pub mod stream;
pub mod unpack;
pub mod write;

pub use store::{MemoryStore, ObjectSink, ObjectSource};

use git_hash::ObjectId;
use git_object::ObjectType;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("object not found: {0}")]
    MissingObject(ObjectId),

    #[error("delta chain too deep (>{max_depth} levels) at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("stream has no running checksum")]
    NotHashed,

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("unsupported pack record type {0}")]
    UnsupportedType(u8),

    #[error("cannot seek back {requested} bytes, only {available} retained")]
    SeekOutOfRange { requested: usize, available: usize },

    #[error("unexpected end of pack data")]
    UnexpectedEof,

    #[error("object store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),
}

/// Type of a pack record as found in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    Commit,
    Tree,
    Blob,
    /// Delta with offset to base in same pack.
    OfsDelta { base_offset: u64 },
    /// Delta referencing base by OID.
    RefDelta { base_oid: ObjectId },
}

impl PackEntryType {
    pub fn to_object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// Type number as used in pack entry headers.
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::OfsDelta { .. } => OFS_DELTA,
            Self::RefDelta { .. } => REF_DELTA,
        }
    }

    pub fn is_delta(&self) -> bool {
        self.to_object_type().is_none()
    }
}

impl From<ObjectType> for PackEntryType {
    fn from(obj_type: ObjectType) -> Self {
        match obj_type {
            ObjectType::Commit => Self::Commit,
            ObjectType::Tree => Self::Tree,
            ObjectType::Blob => Self::Blob,
        }
    }
}

/// Pack header code of a whole object of type `obj_type`.
pub fn type_code(obj_type: ObjectType) -> u8 {
    PackEntryType::from(obj_type).type_number()
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;
pub const PACK_TRAILER_SIZE: usize = git_hash::DIGEST_LEN;

/// Record type codes of the two delta flavours.
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

/// Pack index (v2) constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Maximum delta chain depth followed when reading before we bail out.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;

/// Tuning for pack production.
///
/// Missing keys take their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// zlib level for record bodies, 0-9.
    pub compression: u32,
    /// Number of recent objects considered as delta bases. 0 disables deltas.
    pub window_size: usize,
    /// Longest delta chain the compressor builds.
    pub max_depth: usize,
    /// Emit ofs-delta records instead of ref-delta records.
    pub allow_ofs: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression: 6,
            window_size: compress::WINDOW_SIZE,
            max_depth: compress::MAX_DEPTH,
            allow_ofs: false,
        }
    }
}

impl PackOptions {
    pub fn zlib_level(&self) -> flate2::Compression {
        flate2::Compression::new(self.compression.min(9))
    }
}
