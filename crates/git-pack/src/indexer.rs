//! Install a received pack stream as a `.pack`/`.idx` pair.
//!
//! The stream is copied byte for byte into a temp file while every record is
//! decoded; deltas are then resolved against bases in the same pack, the
//! index is built from the resulting names, offsets and CRC32s, and both
//! files are renamed to `pack-<checksum>.pack` / `.idx`.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_object::RawObject;
use git_utils::tempfile::TempFile;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::delta::Expander;
use crate::index::{encode_index, IndexEntry};
use crate::reader::{Reader, Record};
use crate::PackError;

/// Temp files in the pack directory are named `tmp_pack_XXXXXX` / `tmp_idx_XXXXXX`.
pub const TEMP_PACK_PREFIX: &str = "tmp_pack_";
pub const TEMP_IDX_PREFIX: &str = "tmp_idx_";

/// Where an indexed pack ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub checksum: ObjectId,
    pub count: u32,
}

/// A delta whose base has not been resolved yet.
struct PendingDelta {
    offset: u64,
    base: BaseRef,
    delta: Vec<u8>,
}

enum BaseRef {
    Offset(u64),
    Oid(ObjectId),
}

pub struct Indexer {
    pack_dir: PathBuf,
    rng: Box<dyn RngCore + Send>,
}

impl Indexer {
    pub fn new(pack_dir: impl AsRef<Path>) -> Self {
        Self::with_rng(pack_dir, StdRng::from_entropy())
    }

    /// Use a caller-chosen source for temp-file names.
    pub fn with_rng(pack_dir: impl AsRef<Path>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            pack_dir: pack_dir.as_ref().to_path_buf(),
            rng: Box::new(rng),
        }
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    /// Consume a complete pack stream and install it.
    ///
    /// Nothing is installed unless every record decodes, every delta
    /// resolves within the pack and the trailing checksum matches.
    pub fn index_pack<R: Read>(&mut self, input: R) -> Result<IndexedPack, PackError> {
        std::fs::create_dir_all(&self.pack_dir)?;
        let mut tmp_pack = TempFile::create_in(&self.pack_dir, TEMP_PACK_PREFIX, &mut *self.rng)?;

        let mut reader = Reader::new(input);
        reader.stream_mut().begin_capture();
        let count = reader.read_header()?;
        tmp_pack.write_all(&reader.stream_mut().end_capture())?;

        let mut resolved: HashMap<u64, (ObjectId, RawObject)> = HashMap::new();
        let mut crcs: HashMap<u64, u32> = HashMap::with_capacity(count as usize);
        let mut pending = Vec::new();

        for _ in 0..count {
            reader.stream_mut().begin_capture();
            let (offset, record) = reader.read_record()?;
            let raw_bytes = reader.stream_mut().end_capture();
            crcs.insert(offset, crc32fast::hash(&raw_bytes));
            tmp_pack.write_all(&raw_bytes)?;

            match record {
                Record::Object(raw) => {
                    let oid = raw.compute_oid()?;
                    resolved.insert(offset, (oid, raw));
                }
                Record::RefDelta { base_oid, delta } => pending.push(PendingDelta {
                    offset,
                    base: BaseRef::Oid(base_oid),
                    delta,
                }),
                Record::OfsDelta { base_offset, delta } => pending.push(PendingDelta {
                    offset,
                    base: BaseRef::Offset(base_offset),
                    delta,
                }),
            }
        }

        reader.stream_mut().begin_capture();
        let checksum = reader.verify_checksum()?;
        tmp_pack.write_all(&reader.stream_mut().end_capture())?;

        resolve_deltas(&mut resolved, pending)?;

        let entries: Vec<IndexEntry> = resolved
            .iter()
            .map(|(&offset, (oid, _))| IndexEntry {
                oid: *oid,
                offset,
                crc32: crcs.get(&offset).copied().unwrap_or_default(),
            })
            .collect();
        let idx_bytes = encode_index(&entries, &checksum)?;

        let mut tmp_idx = TempFile::create_in(&self.pack_dir, TEMP_IDX_PREFIX, &mut *self.rng)?;
        tmp_idx.write_all(&idx_bytes)?;

        let name = format!("pack-{}", checksum.to_hex());
        let pack_path = self.pack_dir.join(format!("{name}.pack"));
        let index_path = self.pack_dir.join(format!("{name}.idx"));
        install(tmp_pack, &pack_path)?;
        install(tmp_idx, &index_path)?;

        tracing::debug!(%checksum, count, path = %pack_path.display(), "indexed pack");
        Ok(IndexedPack {
            pack_path,
            index_path,
            checksum,
            count,
        })
    }
}

/// Resolve pending deltas in passes until none is left. A pass that
/// resolves nothing means some base is not in the pack.
fn resolve_deltas(
    resolved: &mut HashMap<u64, (ObjectId, RawObject)>,
    mut pending: Vec<PendingDelta>,
) -> Result<(), PackError> {
    let mut by_oid: HashMap<ObjectId, u64> =
        resolved.iter().map(|(&offset, (oid, _))| (*oid, offset)).collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for p in pending {
            let base_offset = match p.base {
                BaseRef::Offset(offset) => Some(offset),
                BaseRef::Oid(oid) => by_oid.get(&oid).copied(),
            };
            let Some((_, base)) = base_offset.and_then(|o| resolved.get(&o)) else {
                waiting.push(p);
                continue;
            };
            let data = Expander::new(&p.delta)?.expand(&base.data)?;
            let raw = RawObject::new(base.obj_type, data);
            let oid = raw.compute_oid()?;
            tracing::trace!(%oid, offset = p.offset, "resolved delta");
            by_oid.insert(oid, p.offset);
            resolved.insert(p.offset, (oid, raw));
        }
        if waiting.len() == before {
            return Err(match waiting[0].base {
                BaseRef::Oid(oid) => PackError::MissingBase(oid),
                BaseRef::Offset(_) => PackError::CorruptEntry(waiting[0].offset),
            });
        }
        pending = waiting;
    }
    Ok(())
}

/// Make `tmp` read-only and move it to `target`. An identical pack that is
/// already installed wins.
fn install(tmp: TempFile, target: &Path) -> Result<(), PackError> {
    if target.is_file() {
        return Ok(());
    }
    tmp.set_readonly()?;
    match tmp.persist(target) {
        Ok(()) => Ok(()),
        Err(_) if target.is_file() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use git_object::ObjectType;

    use super::*;
    use crate::index::PackIndex;
    use crate::store::MemoryStore;
    use crate::write::Writer;
    use crate::PackOptions;

    fn sample_pack(allow_ofs: bool) -> (MemoryStore, Vec<u8>) {
        let mut store = MemoryStore::new();
        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&format!("entry {i} with some padding to make deltas pay\n"));
            store
                .insert(RawObject::new(ObjectType::Blob, text.clone().into_bytes()))
                .unwrap();
        }
        let options = PackOptions {
            allow_ofs,
            ..PackOptions::default()
        };
        let mut writer = Writer::new(Vec::new(), options);
        let mut entries = writer
            .prepare(&store, store.iter().map(|(oid, _)| (*oid, None)))
            .unwrap();
        writer.write_pack(&store, &mut entries).unwrap();
        (store, writer.into_inner())
    }

    #[test]
    fn installs_pack_and_index() {
        for allow_ofs in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let (store, data) = sample_pack(allow_ofs);
            let mut indexer = Indexer::with_rng(dir.path(), StdRng::seed_from_u64(3));
            let installed = indexer.index_pack(&data[..]).unwrap();

            assert_eq!(installed.count, 10);
            assert_eq!(std::fs::read(&installed.pack_path).unwrap(), data);
            assert!(installed
                .pack_path
                .ends_with(format!("pack-{}.pack", installed.checksum.to_hex())));

            let idx = PackIndex::open(&installed.index_path).unwrap();
            idx.verify_checksum().unwrap();
            assert_eq!(idx.pack_checksum(), installed.checksum);
            for (oid, _) in store.iter() {
                let pos = idx.position(oid).unwrap();
                let offset = idx.offset_at(pos).unwrap() as usize;
                assert!(offset >= 12 && offset < data.len() - 20);
            }

            let leftovers = std::fs::read_dir(dir.path())
                .unwrap()
                .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with("tmp_"))
                .count();
            assert_eq!(leftovers, 0);
        }
    }

    #[test]
    fn crc_covers_raw_record_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (_, data) = sample_pack(false);
        let installed = Indexer::new(dir.path()).index_pack(&data[..]).unwrap();
        let idx = PackIndex::open(&installed.index_path).unwrap();

        let mut offsets: Vec<u64> = idx.iter().map(|e| e.unwrap().offset).collect();
        offsets.sort_unstable();
        offsets.push((data.len() - 20) as u64);
        for e in idx.iter().map(Result::unwrap) {
            let pos = offsets.iter().position(|&o| o == e.offset).unwrap();
            let record = &data[e.offset as usize..offsets[pos + 1] as usize];
            assert_eq!(crc32fast::hash(record), e.crc32);
        }
    }

    #[test]
    fn corrupt_checksum_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut data) = sample_pack(false);
        let last = data.len() - 1;
        data[last] ^= 0xff;
        let err = Indexer::new(dir.path()).index_pack(&data[..]).unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
