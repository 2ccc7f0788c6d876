use std::fs;
use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use git_hash::ObjectId;
use git_object::header::{self, MAX_HEADER_LEN};
use git_object::{Object, ObjectInfo, RawObject};

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Type and content of `oid`, or `Ok(None)` when no such file exists.
    ///
    /// A header whose declared size disagrees with the inflated content is
    /// reported as corruption.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, LooseError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };
        let inflated = inflate_all(&compressed, oid)?;
        let raw = RawObject::from_canonical(&inflated).map_err(|e| LooseError::Corrupt {
            oid: *oid,
            reason: e.to_string(),
        })?;
        Ok(Some(raw))
    }

    /// Type and size from the header alone; only the first few inflated
    /// bytes are produced.
    pub fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, LooseError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; MAX_HEADER_LEN];
        let mut filled = 0;
        while !buf[..filled].contains(&0) {
            if filled == buf.len() {
                return Err(LooseError::Corrupt {
                    oid: *oid,
                    reason: format!("header longer than {MAX_HEADER_LEN} bytes"),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|source| LooseError::Decompress { oid: *oid, source })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: *oid,
                    reason: "end of data inside header".into(),
                });
            }
            filled += n;
        }
        let (obj_type, size, _) = header::parse_header(&buf[..filled])?;
        Ok(Some(ObjectInfo { obj_type, size }))
    }

    /// Parsed object.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, LooseError> {
        match self.read_raw(oid)? {
            Some(raw) => Ok(Some(raw.parse()?)),
            None => Ok(None),
        }
    }

    /// Like [`read_raw`](Self::read_raw), and also rehash the content.
    pub fn read_verified(&self, oid: &ObjectId) -> Result<Option<RawObject>, LooseError> {
        let Some(raw) = self.read_raw(oid)? else {
            return Ok(None);
        };
        let actual = raw.compute_oid()?;
        if actual != *oid {
            return Err(LooseError::HashMismatch {
                path: self.object_path(oid),
                expected: *oid,
                actual,
            });
        }
        Ok(Some(raw))
    }

    fn read_file(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        match fs::read(self.object_path(oid)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn inflate_all(compressed: &[u8], oid: &ObjectId) -> Result<Vec<u8>, LooseError> {
    let mut out = Vec::with_capacity(compressed.len() * 2);
    ZlibDecoder::new(compressed)
        .read_to_end(&mut out)
        .map_err(|source| LooseError::Decompress { oid: *oid, source })?;
    Ok(out)
}
