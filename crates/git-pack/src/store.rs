//! The two narrow seams between the pack transfer path and an object store.

use std::collections::BTreeMap;

use git_hash::ObjectId;
use git_object::{ObjectInfo, RawObject};

use crate::PackError;

/// Read side: where the writer loads objects and the unpacker finds
/// ref-delta bases.
pub trait ObjectSource {
    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError>;

    /// Type and size only. The default loads the whole object.
    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        Ok(self.load_raw(oid)?.map(|raw| raw.info()))
    }
}

/// Write side: where the unpacker puts resolved objects.
pub trait ObjectSink {
    /// Store `raw` and return its name.
    fn store_raw(&mut self, raw: &RawObject) -> Result<ObjectId, PackError>;
}

impl<T: ObjectSource + ?Sized> ObjectSource for &T {
    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError> {
        (**self).load_raw(oid)
    }

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        (**self).load_info(oid)
    }
}

/// An in-memory object store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: BTreeMap<ObjectId, RawObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: RawObject) -> Result<ObjectId, PackError> {
        let oid = raw.compute_oid()?;
        self.objects.entry(oid).or_insert(raw);
        Ok(oid)
    }

    pub fn get(&self, oid: &ObjectId) -> Option<&RawObject> {
        self.objects.get(oid)
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.objects.contains_key(oid)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &RawObject)> {
        self.objects.iter()
    }
}

impl ObjectSource for MemoryStore {
    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError> {
        Ok(self.objects.get(oid).cloned())
    }

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        Ok(self.objects.get(oid).map(RawObject::info))
    }
}

impl ObjectSink for MemoryStore {
    fn store_raw(&mut self, raw: &RawObject) -> Result<ObjectId, PackError> {
        self.insert(raw.clone())
    }
}
