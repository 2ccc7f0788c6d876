//! Loose object storage.
//!
//! Each object lives at `objects/XX/YYYY...`, where `XX` is the first byte of
//! its name in hex and `YYYY...` the remaining 38 characters. The file holds
//! the zlib-compressed canonical encoding `"<type> <size>\0<content>"`.
//!
//! Writes go through an exclusively created temp file in the fan-out
//! directory followed by an atomic rename, so concurrent writers of the same
//! object never observe a partial file.

mod enumerate;
mod read;
mod write;

pub use enumerate::LooseObjectIter;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git_hash::ObjectId;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Temp files in a fan-out directory are named `tmp_obj_XXXXXX`.
pub const TEMP_PREFIX: &str = "tmp_obj_";

/// The loose object directory.
pub struct LooseObjectStore {
    objects_dir: PathBuf,
    compression_level: flate2::Compression,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl LooseObjectStore {
    /// Open the store rooted at `objects_dir`. Nothing is created until the
    /// first write.
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self::with_rng(objects_dir, StdRng::from_entropy())
    }

    /// Open with a caller-chosen source for temp-file names.
    pub fn with_rng(objects_dir: impl AsRef<Path>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            compression_level: flate2::Compression::default(),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Set the zlib compression level (0-9).
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression_level = flate2::Compression::new(level.min(9));
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("decompression error for {oid}: {source}")]
    Decompress {
        oid: ObjectId,
        #[source]
        source: std::io::Error,
    },

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: ObjectId,
        actual: ObjectId,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error("object parse error: {0}")]
    Object(#[from] git_object::ObjectError),

    #[error("hash error: {0}")]
    Hash(#[from] git_hash::HashError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_splits_after_two_chars() {
        let store = LooseObjectStore::open("/tmp/objects");
        let oid = ObjectId::from_hex("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap();
        assert_eq!(
            store.object_path(&oid),
            PathBuf::from("/tmp/objects/b6/fc4c620b67d95f953a5c1c1230aaab5db5a1b0")
        );
    }
}
