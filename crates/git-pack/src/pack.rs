//! PackFile: the packed object backend.
//!
//! Wraps one immutable `.pack` and its `.idx`. The pack is memory-mapped and
//! records are decoded in place with a [`Reader`] positioned at the offset
//! the index gives.

use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_object::{ObjectInfo, RawObject};
use memmap2::Mmap;

use crate::delta::Expander;
use crate::index::PackIndex;
use crate::reader::{Reader, Record};
use crate::stream::Stream;
use crate::{
    PackEntryType, PackError, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE, PACK_SIGNATURE,
    PACK_TRAILER_SIZE, PACK_VERSION,
};

/// A memory-mapped packfile with its index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
}

impl PackFile {
    /// Open a pack file and its associated index.
    ///
    /// Given a `.pack` file path, opens both the pack and its `.idx` file.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        // SAFETY: pack files are written once and never modified in place.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE + PACK_TRAILER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }
        let trailer = &data[data.len() - PACK_TRAILER_SIZE..];
        if trailer != index.pack_checksum().as_bytes() {
            return Err(PackError::InvalidIndex(format!(
                "index {} does not belong to this pack",
                idx_path.display()
            )));
        }

        tracing::debug!(path = %pack_path.display(), objects = num_objects, "opened pack");
        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
        })
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.contains(oid)
    }

    /// Type and content of `oid`, or `None` when it is not in this pack.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError> {
        self.read_raw_with(oid, |_| Ok(None))
    }

    /// Like [`read_raw`](Self::read_raw); ref-delta bases not in this pack
    /// are looked up through `resolver`.
    pub fn read_raw_with(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Result<Option<RawObject>, PackError>,
    ) -> Result<Option<RawObject>, PackError> {
        match self.index.oid_offset(oid)? {
            Some(offset) => self.read_at(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Type and size of `oid` without expanding any delta.
    pub fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        self.read_info_with(oid, |_| Ok(None))
    }

    /// Like [`read_info`](Self::read_info), with a resolver for ref-delta
    /// bases stored elsewhere.
    pub fn read_info_with(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Result<Option<ObjectInfo>, PackError>,
    ) -> Result<Option<ObjectInfo>, PackError> {
        let Some(start) = self.index.oid_offset(oid)? else {
            return Ok(None);
        };
        // The outermost record knows the size; the chain's base knows the type.
        let mut outer_size = None;
        let mut offset = start;
        for _ in 0..=MAX_DELTA_CHAIN_DEPTH {
            let info = self.reader_at(offset)?.read_info()?;
            let size = *outer_size.get_or_insert(info.size);
            match info.entry_type {
                PackEntryType::OfsDelta { base_offset } => offset = base_offset,
                PackEntryType::RefDelta { base_oid } => match self.index.oid_offset(&base_oid)? {
                    Some(base_offset) => offset = base_offset,
                    None => {
                        let base = resolver(&base_oid)?.ok_or(PackError::MissingBase(base_oid))?;
                        return Ok(Some(ObjectInfo {
                            obj_type: base.obj_type,
                            size,
                        }));
                    }
                },
                whole => {
                    let obj_type = whole
                        .to_object_type()
                        .ok_or(PackError::CorruptEntry(offset))?;
                    return Ok(Some(ObjectInfo { obj_type, size }));
                }
            }
        }
        Err(PackError::DeltaChainTooDeep {
            offset: start,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Names in this pack starting with the hex `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        self.index.prefix_match(prefix)
    }

    /// Read the object whose record starts at `offset`.
    ///
    /// Delta chains are collected on an explicit stack, bounded by
    /// [`MAX_DELTA_CHAIN_DEPTH`], and expanded base first.
    pub fn read_at(
        &self,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Result<Option<RawObject>, PackError>,
    ) -> Result<RawObject, PackError> {
        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut current = offset;

        let base = loop {
            if chain.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: MAX_DELTA_CHAIN_DEPTH,
                });
            }
            let (_, record) = self.reader_at(current)?.read_record()?;
            match record {
                Record::Object(raw) => break raw,
                Record::OfsDelta { base_offset, delta } => {
                    chain.push(delta);
                    current = base_offset;
                }
                Record::RefDelta { base_oid, delta } => {
                    chain.push(delta);
                    match self.index.oid_offset(&base_oid)? {
                        Some(base_offset) => current = base_offset,
                        None => {
                            break resolver(&base_oid)?.ok_or(PackError::MissingBase(base_oid))?
                        }
                    }
                }
            }
        };

        let obj_type = base.obj_type;
        let mut data = base.data;
        for delta in chain.iter().rev() {
            data = Expander::new(delta)?.expand(&data)?;
        }
        Ok(RawObject::new(obj_type, data))
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Trailing checksum of the pack; also the pack's name.
    pub fn checksum(&self) -> ObjectId {
        self.index.pack_checksum()
    }

    fn reader_at(&self, offset: u64) -> Result<Reader<&[u8]>, PackError> {
        let end = self.data.len() - PACK_TRAILER_SIZE;
        let start = usize::try_from(offset)
            .ok()
            .filter(|&o| o >= PACK_HEADER_SIZE && o < end)
            .ok_or(PackError::CorruptEntry(offset))?;
        Ok(Reader::from_stream(Stream::unhashed_at(
            &self.data[start..end],
            offset,
        )))
    }
}
