use std::io::Write;

use flate2::write::ZlibEncoder;
use git_hash::ObjectId;
use git_object::{Object, ObjectType, RawObject};
use git_utils::tempfile::TempFile;

use crate::{LooseError, LooseObjectStore, TEMP_PREFIX};

impl LooseObjectStore {
    /// Store a parsed object and return its name. Idempotent.
    pub fn write(&self, obj: &Object) -> Result<ObjectId, LooseError> {
        self.write_raw(obj.object_type(), &obj.serialize_content())
    }

    /// Store `content` as an object of type `obj_type` and return its name.
    ///
    /// Nothing is written when the object is already present.
    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let raw = RawObject::new(obj_type, content.to_vec());
        let oid = raw.compute_oid()?;
        if self.contains(&oid) {
            return Ok(oid);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression_level);
        encoder.write_all(&raw.canonical())?;
        self.write_object(&oid, &encoder.finish()?)?;
        Ok(oid)
    }

    /// Place already-compressed bytes at the path for `oid`.
    ///
    /// The caller vouches that `compressed` inflates to the canonical encoding
    /// of `oid`. An existing file is left untouched. The fan-out directory is
    /// created on demand.
    pub fn write_object(&self, oid: &ObjectId, compressed: &[u8]) -> Result<(), LooseError> {
        let final_path = self.object_path(oid);
        if final_path.is_file() {
            return Ok(());
        }
        let fanout_dir = final_path.parent().unwrap_or(self.objects_dir.as_path());

        let mut tmp = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            TempFile::create_in(fanout_dir, TEMP_PREFIX, &mut **rng)?
        };
        tmp.write_all(compressed)?;
        tmp.set_readonly()?;

        match tmp.persist(&final_path) {
            Ok(()) => {
                tracing::debug!(%oid, bytes = compressed.len(), "wrote loose object");
                Ok(())
            }
            // Another writer installed the same content first.
            Err(_) if final_path.is_file() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
