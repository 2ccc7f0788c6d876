//! Pack index (v2) reading, lookup and writing.
//!
//! The pack index provides fast OID → offset mapping using a fan-out table
//! and binary search. Format:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 values
//! Offsets: N × 4-byte offsets (high bit = 1 → use 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use git_hash::fanout::{FanoutTable, FANOUT_BYTES};
use git_hash::hasher::Hasher;
use git_hash::hex::{decode_prefix, is_hex_prefix};
use git_hash::{ObjectId, DIGEST_LEN};
use git_utils::tempfile::TempFile;
use memmap2::Mmap;

use crate::indexer::TEMP_IDX_PREFIX;
use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const HEADER_LEN: usize = 8;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// One row of an index: where a record starts and the CRC32 of its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub oid: ObjectId,
    pub offset: u64,
    pub crc32: u32,
}

/// Pack index (v2) providing OID → offset mapping.
pub struct PackIndex {
    data: Mmap,
    fanout: FanoutTable,
    num_objects: u32,
    /// Byte offset where sorted OIDs start.
    oid_offset: usize,
    /// Byte offset where CRC32 values start.
    crc_offset: usize,
    /// Byte offset where 32-bit offsets start.
    offset32_offset: usize,
    /// Byte offset where 64-bit offsets start (if any).
    offset64_offset: usize,
    /// Number of entries in the 64-bit table.
    num_large: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        // SAFETY: index files are written once and never modified in place.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < HEADER_LEN + FANOUT_BYTES + 2 * DIGEST_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout = FanoutTable::from_bytes(&data[HEADER_LEN..])
            .map_err(|e| PackError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();

        let n = num_objects as usize;
        let oid_offset = HEADER_LEN + FANOUT_BYTES;
        let crc_offset = oid_offset + n * DIGEST_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        let min_size = offset64_offset + 2 * DIGEST_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }
        let large_bytes = data.len() - min_size;
        if large_bytes % 8 != 0 {
            return Err(PackError::InvalidIndex(format!(
                "64-bit offset table has {large_bytes} bytes"
            )));
        }

        Ok(Self {
            data,
            fanout,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            num_large: large_bytes / 8,
            idx_path,
        })
    }

    /// Sorted position of `oid`, if present.
    pub fn position(&self, oid: &ObjectId) -> Option<usize> {
        let range = self.fanout.range(oid.first_byte());
        let target = oid.as_bytes();

        let mut low = range.start;
        let mut high = range.end;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(&target[..]) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.position(oid).is_some()
    }

    /// Pack offset of `oid`.
    pub fn oid_offset(&self, oid: &ObjectId) -> Result<Option<u64>, PackError> {
        match self.position(oid) {
            Some(pos) => self.offset_at(pos).map(Some),
            None => Ok(None),
        }
    }

    /// All names starting with the hex `prefix` (case-insensitive), sorted.
    ///
    /// Matches are contiguous in the table: binary search finds the first
    /// name not below the zero-padded prefix, and the scan stops at the first
    /// name that does not match.
    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        if !is_hex_prefix(prefix) {
            return Vec::new();
        }
        let Ok(key) = decode_prefix(prefix) else {
            return Vec::new();
        };

        let mut low = 0;
        let mut high = self.num_objects as usize;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.oid_bytes_at(mid) < &key[..] {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        (low..self.num_objects as usize)
            .map(|pos| self.oid_at(pos))
            .take_while(|oid| oid.starts_with_hex(prefix))
            .collect()
    }

    /// OID at the given sorted position.
    pub fn oid_at(&self, pos: usize) -> ObjectId {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(self.oid_bytes_at(pos));
        ObjectId::new(bytes)
    }

    /// Pack offset at the given sorted position.
    pub fn offset_at(&self, pos: usize) -> Result<u64, PackError> {
        let val = self.u32_at(self.offset32_offset + pos * 4);
        if val & LARGE_OFFSET_FLAG == 0 {
            return Ok(val as u64);
        }
        let idx64 = (val & !LARGE_OFFSET_FLAG) as usize;
        if idx64 >= self.num_large {
            return Err(PackError::InvalidIndex(format!(
                "64-bit offset index {idx64} out of range ({} entries)",
                self.num_large
            )));
        }
        let p = self.offset64_offset + idx64 * 8;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[p..p + 8]);
        Ok(u64::from_be_bytes(bytes))
    }

    /// CRC32 of the raw record at the given sorted position.
    pub fn crc32_at(&self, pos: usize) -> u32 {
        self.u32_at(self.crc_offset + pos * 4)
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn fanout(&self) -> &FanoutTable {
        &self.fanout
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Pack checksum stored in the index trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        self.trailer_id(2 * DIGEST_LEN)
    }

    /// Checksum of the index file itself.
    pub fn index_checksum(&self) -> ObjectId {
        self.trailer_id(DIGEST_LEN)
    }

    /// Recompute the index checksum and compare it with the trailer.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let body = &self.data[..self.data.len() - DIGEST_LEN];
        let actual = Hasher::digest(body)?;
        let expected = self.index_checksum();
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    /// All entries in OID order.
    pub fn iter(&self) -> impl Iterator<Item = Result<IndexEntry, PackError>> + '_ {
        (0..self.num_objects as usize).map(|pos| {
            Ok(IndexEntry {
                oid: self.oid_at(pos),
                offset: self.offset_at(pos)?,
                crc32: self.crc32_at(pos),
            })
        })
    }

    fn trailer_id(&self, from_end: usize) -> ObjectId {
        let start = self.data.len() - from_end;
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&self.data[start..start + DIGEST_LEN]);
        ObjectId::new(bytes)
    }

    fn u32_at(&self, pos: usize) -> u32 {
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    fn oid_bytes_at(&self, pos: usize) -> &[u8] {
        let start = self.oid_offset + pos * DIGEST_LEN;
        &self.data[start..start + DIGEST_LEN]
    }
}

/// Encode a v2 index over `entries` (any order) for the pack whose trailer
/// is `pack_checksum`. Offsets of 2 GiB and above go to the 64-bit table.
pub fn encode_index(entries: &[IndexEntry], pack_checksum: &ObjectId) -> Result<Vec<u8>, PackError> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.oid.cmp(&b.oid));
    if let Some(w) = sorted.windows(2).find(|w| w[0].oid == w[1].oid) {
        return Err(PackError::InvalidIndex(format!("duplicate object {}", w[0].oid)));
    }

    let n = sorted.len();
    let mut buf = Vec::with_capacity(HEADER_LEN + FANOUT_BYTES + n * (DIGEST_LEN + 8) + 2 * DIGEST_LEN);
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let oids: Vec<ObjectId> = sorted.iter().map(|e| e.oid).collect();
    buf.extend_from_slice(&FanoutTable::build(&oids).to_bytes());

    for oid in &oids {
        buf.extend_from_slice(oid.as_bytes());
    }
    for entry in &sorted {
        buf.extend_from_slice(&entry.crc32.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for entry in &sorted {
        if entry.offset >= LARGE_OFFSET_FLAG as u64 {
            let idx = large_offsets.len() as u32;
            buf.extend_from_slice(&(LARGE_OFFSET_FLAG | idx).to_be_bytes());
            large_offsets.push(entry.offset);
        } else {
            buf.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum.as_bytes());
    let idx_checksum = Hasher::digest(&buf)?;
    buf.extend_from_slice(idx_checksum.as_bytes());
    Ok(buf)
}

/// Write a v2 index file. Returns the index checksum.
///
/// The bytes go to an exclusively created temp file next to `idx_path`,
/// which is then renamed over it.
pub fn write_index(
    idx_path: &Path,
    entries: &[IndexEntry],
    pack_checksum: &ObjectId,
) -> Result<ObjectId, PackError> {
    let buf = encode_index(entries, pack_checksum)?;
    let dir = match idx_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = TempFile::create_in(dir, TEMP_IDX_PREFIX, &mut rand::thread_rng())?;
    tmp.write_all(&buf)?;
    tmp.persist(idx_path)?;
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(&buf[buf.len() - DIGEST_LEN..]);
    Ok(ObjectId::new(bytes))
}
