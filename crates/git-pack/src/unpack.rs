//! Explode a pack stream into an object store.

use std::collections::HashMap;
use std::io::Read;

use git_hash::ObjectId;
use git_object::RawObject;

use crate::delta::Expander;
use crate::reader::{Reader, Record};
use crate::store::{ObjectSink, ObjectSource};
use crate::PackError;

/// Outcome of [`Unpacker::process_pack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackSummary {
    pub count: u32,
    pub deltas: u32,
    pub checksum: ObjectId,
}

/// Stores every object of a pack into `target`, one record at a time.
///
/// Ref-delta bases are loaded from `target`, so they must either precede
/// the delta in the pack or already be stored. Ofs-delta bases are found
/// through the offsets seen earlier in the same pack.
pub struct Unpacker<'a, T: ObjectSource + ObjectSink + ?Sized> {
    target: &'a mut T,
}

impl<'a, T: ObjectSource + ObjectSink + ?Sized> Unpacker<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        Self { target }
    }

    /// Read a whole pack from `input`.
    ///
    /// The trailing checksum is verified last; objects stored before a
    /// failure stay stored.
    pub fn process_pack<R: Read>(&mut self, input: R) -> Result<UnpackSummary, PackError> {
        let mut reader = Reader::new(input);
        let count = reader.read_header()?;
        let mut by_offset: HashMap<u64, ObjectId> = HashMap::with_capacity(count as usize);
        let mut deltas = 0;

        for _ in 0..count {
            let (offset, record) = reader.read_record()?;
            let raw = match record {
                Record::Object(raw) => raw,
                Record::RefDelta { base_oid, delta } => {
                    deltas += 1;
                    self.expand_against(&base_oid, &delta)?
                }
                Record::OfsDelta { base_offset, delta } => {
                    deltas += 1;
                    let base_oid = *by_offset
                        .get(&base_offset)
                        .ok_or(PackError::CorruptEntry(offset))?;
                    self.expand_against(&base_oid, &delta)?
                }
            };
            let oid = self.target.store_raw(&raw)?;
            tracing::trace!(%oid, offset, kind = %raw.obj_type, "unpacked object");
            by_offset.insert(offset, oid);
        }

        let checksum = reader.verify_checksum()?;
        tracing::debug!(count, deltas, %checksum, "pack unpacked");
        Ok(UnpackSummary {
            count,
            deltas,
            checksum,
        })
    }

    fn expand_against(&self, base_oid: &ObjectId, delta: &[u8]) -> Result<RawObject, PackError> {
        let base = self
            .target
            .load_raw(base_oid)?
            .ok_or(PackError::MissingBase(*base_oid))?;
        let data = Expander::new(delta)?.expand(&base.data)?;
        Ok(RawObject::new(base.obj_type, data))
    }
}

#[cfg(test)]
mod tests {
    use git_object::ObjectType;

    use super::*;
    use crate::delta::Delta;
    use crate::entry::encode_entry_header;
    use crate::store::MemoryStore;
    use crate::write::Writer;
    use crate::{PackOptions, REF_DELTA};

    fn pack_of(store: &MemoryStore, options: PackOptions) -> Vec<u8> {
        let mut writer = Writer::new(Vec::new(), options);
        let mut entries = writer
            .prepare(store, store.iter().map(|(oid, _)| (*oid, None)))
            .unwrap();
        writer.write_pack(store, &mut entries).unwrap();
        writer.into_inner()
    }

    #[test]
    fn unpacks_into_empty_store() {
        let mut source = MemoryStore::new();
        let mut body = String::new();
        for i in 0..12 {
            body.push_str(&format!("paragraph {i}: the same words again and again\n"));
            source
                .insert(RawObject::new(ObjectType::Blob, body.clone().into_bytes()))
                .unwrap();
        }
        for allow_ofs in [false, true] {
            let data = pack_of(
                &source,
                PackOptions {
                    allow_ofs,
                    ..PackOptions::default()
                },
            );
            let mut target = MemoryStore::new();
            let summary = Unpacker::new(&mut target).process_pack(&data[..]).unwrap();
            assert_eq!(summary.count, 12);
            assert!(summary.deltas > 0);
            assert_eq!(target.len(), source.len());
            for (oid, raw) in source.iter() {
                assert_eq!(target.get(oid), Some(raw));
            }
        }
    }

    #[test]
    fn ref_delta_base_from_existing_store() {
        let base = RawObject::new(ObjectType::Blob, b"0123456789abcdef0123456789abcdef".to_vec());
        let target_data = b"0123456789abcdef0123456789abcdef+".to_vec();
        let delta = Delta::new(&base.data, &target_data);

        let mut target = MemoryStore::new();
        let base_oid = target.insert(base.clone()).unwrap();

        let mut record = encode_entry_header(REF_DELTA, delta.size() as u64);
        record.extend_from_slice(base_oid.as_bytes());
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut enc, delta.data()).unwrap();
        record.extend(enc.finish().unwrap());

        let mut data = b"PACK\0\0\0\x02\0\0\0\x01".to_vec();
        data.extend(record);
        let checksum = git_hash::hasher::Hasher::digest(&data).unwrap();
        data.extend_from_slice(checksum.as_bytes());

        let summary = Unpacker::new(&mut target).process_pack(&data[..]).unwrap();
        assert_eq!(summary.deltas, 1);
        let oid = RawObject::new(ObjectType::Blob, target_data.clone())
            .compute_oid()
            .unwrap();
        assert_eq!(target.get(&oid).unwrap().data, target_data);
    }

    #[test]
    fn missing_ref_base_fails() {
        let mut data = b"PACK\0\0\0\x02\0\0\0\x01".to_vec();
        let delta = Delta::new(b"abc", b"abcd");
        data.extend(encode_entry_header(REF_DELTA, delta.size() as u64));
        data.extend_from_slice(&[0x11; 20]);
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut enc, delta.data()).unwrap();
        data.extend(enc.finish().unwrap());

        let mut target = MemoryStore::new();
        assert!(matches!(
            Unpacker::new(&mut target).process_pack(&data[..]),
            Err(PackError::MissingBase(_))
        ));
    }
}
