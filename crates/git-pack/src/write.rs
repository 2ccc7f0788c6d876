//! Pack generation.
//!
//! [`Writer::prepare`] turns a list of object names into [`PackEntry`]s,
//! [`Writer::write_pack`] runs the [`Compressor`](crate::compress::Compressor)
//! over them and streams the pack to any [`Write`].

use std::collections::HashSet;
use std::io::Write;

use flate2::write::ZlibEncoder;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::ObjectType;

use crate::compress::Compressor;
use crate::delta::Delta;
use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
use crate::index::IndexEntry;
use crate::store::ObjectSource;
use crate::{
    type_code, PackError, PackOptions, OFS_DELTA, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION,
    REF_DELTA,
};

/// One object to be written, annotated by the compressor.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub oid: ObjectId,
    pub obj_type: ObjectType,
    pub size: usize,
    /// Path the object was reached through; groups similar files together.
    pub path: Option<String>,
    pub delta: Option<DeltaChoice>,
    /// Length of the delta chain below this entry; 0 for whole objects.
    pub depth: usize,
}

impl PackEntry {
    pub fn new(oid: ObjectId, obj_type: ObjectType, size: usize, path: Option<String>) -> Self {
        Self {
            oid,
            obj_type,
            size,
            path,
            delta: None,
            depth: 0,
        }
    }
}

/// The base picked for an entry and the delta against it.
#[derive(Debug, Clone)]
pub struct DeltaChoice {
    /// Position of the base in the entry list.
    pub base: usize,
    pub base_oid: ObjectId,
    pub delta: Delta,
}

/// What [`Writer::write_pack`] produced.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub count: u32,
    pub deltas: usize,
    /// Total bytes written, trailer included.
    pub bytes: u64,
    pub checksum: ObjectId,
    /// Offset and CRC32 of every record, in write order.
    pub index: Vec<IndexEntry>,
}

/// Streams a pack to `out`, checksumming every byte.
pub struct Writer<W: Write> {
    out: W,
    hasher: Hasher,
    position: u64,
    options: PackOptions,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, options: PackOptions) -> Self {
        Self {
            out,
            hasher: Hasher::new(),
            position: 0,
            options,
        }
    }

    /// Look up type and size of every object. Duplicate names are dropped.
    pub fn prepare<S, I>(&self, source: &S, objects: I) -> Result<Vec<PackEntry>, PackError>
    where
        S: ObjectSource + ?Sized,
        I: IntoIterator<Item = (ObjectId, Option<String>)>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (oid, path) in objects {
            if !seen.insert(oid) {
                continue;
            }
            let info = source
                .load_info(&oid)?
                .ok_or(PackError::MissingObject(oid))?;
            entries.push(PackEntry::new(oid, info.obj_type, info.size, path));
        }
        Ok(entries)
    }

    /// Pick deltas, then write header, records and trailer.
    ///
    /// Entries are written in list order, except that a delta's base is
    /// always written before the delta itself.
    pub fn write_pack<S: ObjectSource + ?Sized>(
        &mut self,
        source: &S,
        entries: &mut [PackEntry],
    ) -> Result<PackSummary, PackError> {
        let count = u32::try_from(entries.len())
            .map_err(|_| PackError::InvalidHeader("too many objects for one pack".into()))?;
        let deltas = Compressor::new(source, &self.options).compress(entries)?;

        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&count.to_be_bytes());
        self.write_bytes(&header)?;

        let mut offsets: Vec<Option<u64>> = vec![None; entries.len()];
        let mut index = Vec::with_capacity(entries.len());
        for start in 0..entries.len() {
            // Walk down to the first unwritten base, then write upwards.
            let mut chain = vec![start];
            let mut current = start;
            while offsets[current].is_none() {
                match &entries[current].delta {
                    Some(choice) if offsets[choice.base].is_none() => {
                        current = choice.base;
                        chain.push(current);
                    }
                    _ => break,
                }
            }
            for &i in chain.iter().rev() {
                if offsets[i].is_none() {
                    let entry = self.write_entry(source, &entries[i], &offsets)?;
                    offsets[i] = Some(entry.offset);
                    index.push(entry);
                }
            }
        }

        let checksum = self.finish_checksum()?;
        self.out.write_all(checksum.as_bytes())?;
        self.out.flush()?;
        self.position += checksum.as_bytes().len() as u64;

        tracing::debug!(count, deltas, bytes = self.position, %checksum, "pack written");
        Ok(PackSummary {
            count,
            deltas,
            bytes: self.position,
            checksum,
            index,
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_entry<S: ObjectSource + ?Sized>(
        &mut self,
        source: &S,
        entry: &PackEntry,
        offsets: &[Option<u64>],
    ) -> Result<IndexEntry, PackError> {
        let offset = self.position;
        let mut crc = crc32fast::Hasher::new();

        let body = match &entry.delta {
            Some(choice) => {
                let base_offset = offsets[choice.base]
                    .ok_or(PackError::MissingBase(choice.base_oid))?;
                let data = choice.delta.data();
                let header = if self.options.allow_ofs {
                    let mut h = encode_entry_header(OFS_DELTA, data.len() as u64);
                    h.extend(encode_ofs_delta_offset(offset - base_offset));
                    h
                } else {
                    let mut h = encode_entry_header(REF_DELTA, data.len() as u64);
                    h.extend_from_slice(choice.base_oid.as_bytes());
                    h
                };
                crc.update(&header);
                self.write_bytes(&header)?;
                self.deflate(data)?
            }
            None => {
                let raw = source
                    .load_raw(&entry.oid)?
                    .ok_or(PackError::MissingObject(entry.oid))?;
                let header = encode_entry_header(type_code(raw.obj_type), raw.data.len() as u64);
                crc.update(&header);
                self.write_bytes(&header)?;
                self.deflate(&raw.data)?
            }
        };
        crc.update(&body);
        self.write_bytes(&body)?;

        tracing::trace!(oid = %entry.oid, offset, delta = entry.delta.is_some(), "wrote pack record");
        Ok(IndexEntry {
            oid: entry.oid,
            offset,
            crc32: crc.finalize(),
        })
    }

    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>, PackError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.options.zlib_level());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.out.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }

    fn finish_checksum(&mut self) -> Result<ObjectId, PackError> {
        Ok(std::mem::take(&mut self.hasher).finalize()?)
    }
}

#[cfg(test)]
mod tests {
    use git_object::RawObject;

    use super::*;
    use crate::reader::{Reader, Record};
    use crate::store::MemoryStore;

    fn store_with(objects: &[(ObjectType, &[u8])]) -> (MemoryStore, Vec<ObjectId>) {
        let mut store = MemoryStore::new();
        let oids = objects
            .iter()
            .map(|(t, d)| store.insert(RawObject::new(*t, d.to_vec())).unwrap())
            .collect();
        (store, oids)
    }

    #[test]
    fn header_and_trailer() {
        let (store, oids) = store_with(&[(ObjectType::Blob, b"hello")]);
        let mut writer = Writer::new(Vec::new(), PackOptions::default());
        let mut entries = writer
            .prepare(&store, oids.iter().map(|o| (*o, None)))
            .unwrap();
        let summary = writer.write_pack(&store, &mut entries).unwrap();
        let data = writer.into_inner();

        assert_eq!(&data[..4], b"PACK");
        assert_eq!(&data[4..12], &[0, 0, 0, 2, 0, 0, 0, 1]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.bytes, data.len() as u64);
        let body_len = data.len() - 20;
        assert_eq!(
            Hasher::digest(&data[..body_len]).unwrap(),
            summary.checksum
        );
        assert_eq!(&data[body_len..], summary.checksum.as_bytes());
        assert_eq!(summary.index[0].offset, 12);
    }

    #[test]
    fn prepare_rejects_unknown_and_dedupes() {
        let (store, oids) = store_with(&[(ObjectType::Blob, b"one")]);
        let writer = Writer::new(Vec::new(), PackOptions::default());
        let entries = writer
            .prepare(&store, [(oids[0], None), (oids[0], Some("dup".into()))])
            .unwrap();
        assert_eq!(entries.len(), 1);

        let missing = ObjectId::new([9; 20]);
        assert!(matches!(
            writer.prepare(&store, [(missing, None)]),
            Err(PackError::MissingObject(oid)) if oid == missing
        ));
    }

    #[test]
    fn delta_base_is_written_first() {
        let base = "shared line of text\n".repeat(20);
        let target = format!("{base}one more line\n");
        let (store, oids) = store_with(&[
            (ObjectType::Blob, target.as_bytes()),
            (ObjectType::Blob, base.as_bytes()),
        ]);
        for allow_ofs in [false, true] {
            let options = PackOptions {
                allow_ofs,
                ..PackOptions::default()
            };
            let mut writer = Writer::new(Vec::new(), options);
            let mut entries = writer
                .prepare(&store, oids.iter().map(|o| (*o, Some("f.txt".into()))))
                .unwrap();
            let summary = writer.write_pack(&store, &mut entries).unwrap();
            assert_eq!(summary.deltas, 1);
            let data = writer.into_inner();

            let mut reader = Reader::new(&data[..]);
            assert_eq!(reader.read_header().unwrap(), 2);
            let mut kinds = Vec::new();
            for _ in 0..2 {
                kinds.push(reader.read_record().unwrap().1);
            }
            reader.verify_checksum().unwrap();
            assert!(matches!(kinds[0], Record::Object(_)));
            if allow_ofs {
                assert!(matches!(kinds[1], Record::OfsDelta { base_offset: 12, .. }));
            } else {
                assert!(matches!(kinds[1], Record::RefDelta { .. }));
            }
        }
    }
}
