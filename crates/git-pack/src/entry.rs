//! Pack record header encoding.
//!
//! ```text
//! byte 0:  [M TTT SSSS]  M = more size bytes, T = type, S = size bits 0-3
//! byte n:  [M SSSSSSS]   next 7 size bits
//! ofs-delta: big-endian base distance, 7 bits per byte, +1 per continuation
//! ref-delta: 20-byte base OID
//! ```

use git_hash::{ObjectId, DIGEST_LEN};

use crate::{PackEntryType, PackError, OFS_DELTA, REF_DELTA};

/// A decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub entry_type: PackEntryType,
    /// Inflated body size. For deltas this is the size of the delta itself.
    pub size: usize,
    /// Bytes the header occupied.
    pub header_len: usize,
}

/// Decode a record header starting at absolute pack offset `entry_offset`,
/// pulling bytes from `next_byte`.
pub fn decode_entry_header(
    entry_offset: u64,
    mut next_byte: impl FnMut() -> Result<u8, PackError>,
) -> Result<EntryHeader, PackError> {
    let mut header_len = 1;
    let c = next_byte()?;

    let type_num = (c >> 4) & 0x07;
    let mut size: u64 = (c & 0x0f) as u64;
    let mut shift = 4;
    let mut byte = c;
    while byte & 0x80 != 0 {
        if shift > 57 {
            return Err(PackError::CorruptEntry(entry_offset));
        }
        byte = next_byte()?;
        header_len += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }
    let size = usize::try_from(size).map_err(|_| PackError::CorruptEntry(entry_offset))?;

    let entry_type = match type_num {
        1 => PackEntryType::Commit,
        2 => PackEntryType::Tree,
        3 => PackEntryType::Blob,
        OFS_DELTA => {
            let mut c = next_byte()?;
            header_len += 1;
            let mut distance = (c & 0x7f) as u64;
            while c & 0x80 != 0 {
                if distance >= 1 << 56 {
                    return Err(PackError::CorruptEntry(entry_offset));
                }
                c = next_byte()?;
                header_len += 1;
                distance = ((distance + 1) << 7) + (c & 0x7f) as u64;
            }
            // The base must start strictly before this record.
            if distance == 0 || distance > entry_offset {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            PackEntryType::OfsDelta {
                base_offset: entry_offset - distance,
            }
        }
        REF_DELTA => {
            let mut bytes = [0u8; DIGEST_LEN];
            for b in bytes.iter_mut() {
                *b = next_byte()?;
            }
            header_len += DIGEST_LEN;
            PackEntryType::RefDelta {
                base_oid: ObjectId::new(bytes),
            }
        }
        other => return Err(PackError::UnsupportedType(other)),
    };

    Ok(EntryHeader {
        entry_type,
        size,
        header_len,
    })
}

/// Decode a record header at the start of `data`.
pub fn parse_entry_header(data: &[u8], entry_offset: u64) -> Result<EntryHeader, PackError> {
    let mut bytes = data.iter();
    decode_entry_header(entry_offset, || {
        bytes.next().copied().ok_or(PackError::UnexpectedEof)
    })
}

/// Encode the type-and-size part of a record header.
///
/// For OFS_DELTA and REF_DELTA, the caller appends the base reference.
pub fn encode_entry_header(type_num: u8, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut s = size;

    let mut c = (type_num << 4) | (s & 0x0f) as u8;
    s >>= 4;

    while s > 0 {
        buf.push(c | 0x80);
        c = (s & 0x7f) as u8;
        s >>= 7;
    }
    buf.push(c);
    buf
}

/// Encode the distance from an ofs-delta record back to its base.
pub fn encode_ofs_delta_offset(distance: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut off = distance;

    buf.push((off & 0x7f) as u8);
    off >>= 7;
    while off > 0 {
        off -= 1;
        buf.push(0x80 | (off & 0x7f) as u8);
        off >>= 7;
    }
    buf.reverse();
    buf
}
