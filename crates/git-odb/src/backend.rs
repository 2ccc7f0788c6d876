//! The read interface shared by every storage backend.

use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_object::{ObjectInfo, RawObject};
use git_pack::pack::PackFile;
use git_pack::{ObjectSink, ObjectSource, PackError};

use crate::{ObjectDatabase, OdbError};

/// A place objects can be looked up in.
///
/// Misses are `Ok(None)`; errors mean the backend itself is unreadable or
/// corrupt.
pub trait OdbBackend: Send + Sync {
    fn contains(&self, oid: &ObjectId) -> bool;

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError>;

    /// Type and size only.
    fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError>;

    /// Every name starting with the hex `prefix`.
    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError>;
}

impl OdbBackend for LooseObjectStore {
    fn contains(&self, oid: &ObjectId) -> bool {
        LooseObjectStore::contains(self, oid)
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        Ok(LooseObjectStore::read_raw(self, oid)?)
    }

    fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        Ok(LooseObjectStore::read_info(self, oid)?)
    }

    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        Ok(LooseObjectStore::prefix_match(self, prefix)?)
    }
}

/// A single pack on its own: ref-delta bases outside the pack are misses.
impl OdbBackend for PackFile {
    fn contains(&self, oid: &ObjectId) -> bool {
        PackFile::contains(self, oid)
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        Ok(PackFile::read_raw(self, oid)?)
    }

    fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        Ok(PackFile::read_info(self, oid)?)
    }

    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        Ok(PackFile::prefix_match(self, prefix))
    }
}

impl OdbBackend for ObjectDatabase {
    fn contains(&self, oid: &ObjectId) -> bool {
        ObjectDatabase::contains(self, oid)
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        ObjectDatabase::read_raw(self, oid)
    }

    fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        ObjectDatabase::read_info(self, oid)
    }

    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        ObjectDatabase::prefix_match(self, prefix)
    }
}

/// Packs are produced from the whole database.
impl ObjectSource for ObjectDatabase {
    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError> {
        ObjectDatabase::read_raw(self, oid).map_err(store_error)
    }

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        ObjectDatabase::read_info(self, oid).map_err(store_error)
    }
}

/// Unpacked objects become loose objects.
impl ObjectSink for ObjectDatabase {
    fn store_raw(&mut self, raw: &RawObject) -> Result<ObjectId, PackError> {
        self.write_raw(raw.obj_type, &raw.data).map_err(store_error)
    }
}

fn store_error(err: OdbError) -> PackError {
    match err {
        OdbError::Pack(inner) => inner,
        other => PackError::Store(Box::new(other)),
    }
}
