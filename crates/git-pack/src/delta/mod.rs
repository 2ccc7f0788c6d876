//! Delta encoding and decoding.
//!
//! A delta describes how to reconstruct a target object from a base
//! (source) object using copy and insert operations.
//!
//! Delta format:
//! ```text
//! [source_size: varint] [target_size: varint]
//! [instruction]*
//! ```
//!
//! Instructions:
//! - Copy:   `[1SSSOOOO] [offset_bytes] [size_bytes]`, the non-zero bytes of
//!   the little-endian value `size << 32 | offset`, flagged by the low bits
//! - Insert: `[0NNNNNNN] [N literal bytes]`, 1 <= N <= 127
//!
//! Varints are 7-bit little-endian groups, MSB set on all but the last.

mod expand;
mod index;

pub use expand::Expander;
pub use index::DeltaIndex;

use crate::PackError;

/// Source blocks indexed by [`DeltaIndex`] are this many bytes long.
pub const BLOCK_SIZE: usize = 16;

/// Longest run a single Copy may describe.
pub const MAX_COPY_SIZE: usize = 0xFF_FFFF;

/// Longest literal a single Insert may carry.
pub const MAX_INSERT_SIZE: usize = 0x7F;

/// A Copy whose encoded size is zero copies this many bytes.
pub const COPY_ZERO_SIZE: usize = 0x10000;

/// A single delta instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Copy bytes from the base (source) object.
    Copy { offset: usize, size: usize },
    /// Insert literal bytes into the output.
    Insert(Vec<u8>),
}

/// An encoded delta together with the operations it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub source_size: usize,
    pub target_size: usize,
    pub ops: Vec<DeltaOp>,
    data: Vec<u8>,
}

impl Delta {
    /// Compute the delta turning `source` into `target`.
    pub fn new(source: &[u8], target: &[u8]) -> Self {
        Self::with_index(&DeltaIndex::new(source), source, target)
    }

    /// Like [`new`](Self::new), reusing an index already built over `source`.
    pub fn with_index(index: &DeltaIndex, source: &[u8], target: &[u8]) -> Self {
        Self::from_ops(source.len(), target.len(), index.compress(source, target))
    }

    pub fn from_ops(source_size: usize, target_size: usize, ops: Vec<DeltaOp>) -> Self {
        let mut data = Vec::with_capacity(16 + ops.len() * 8);
        write_varint(&mut data, source_size);
        write_varint(&mut data, target_size);
        for op in &ops {
            encode_op(&mut data, op);
        }
        Self {
            source_size,
            target_size,
            ops,
            data,
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Read a variable-length size from delta header bytes.
///
/// Returns `(value, bytes_consumed)`, or `None` when the input ends inside
/// the number or it does not fit a `usize`.
pub fn read_varint(data: &[u8]) -> Option<(usize, usize)> {
    let mut value: usize = 0;
    let mut shift = 0u32;
    for (pos, &byte) in data.iter().enumerate() {
        if shift >= usize::BITS {
            return None;
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Some((value, pos + 1));
        }
    }
    None
}

/// Append `value` as a varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append the wire form of one operation.
pub fn encode_op(out: &mut Vec<u8>, op: &DeltaOp) {
    match op {
        DeltaOp::Insert(bytes) => {
            debug_assert!(!bytes.is_empty() && bytes.len() <= MAX_INSERT_SIZE);
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
        DeltaOp::Copy { offset, size } => {
            let value = ((*size as u64) << 32) | (*offset as u64 & 0xFFFF_FFFF);
            let cmd_pos = out.len();
            out.push(0x80);
            for i in 0..7 {
                let byte = (value >> (8 * i)) as u8;
                if byte != 0 {
                    out[cmd_pos] |= 1 << i;
                    out.push(byte);
                }
            }
        }
    }
}

/// One decoded instruction, borrowing insert literals from the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op<'a> {
    Copy { offset: usize, size: usize },
    Insert(&'a [u8]),
}

/// Decoder over the instruction part of a delta.
pub(crate) struct OpIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OpIter<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn byte(&mut self, what: &str) -> Result<u8, PackError> {
        let b = *self.data.get(self.pos).ok_or_else(|| PackError::InvalidDelta {
            offset: self.pos as u64,
            reason: format!("truncated {what}"),
        })?;
        self.pos += 1;
        Ok(b)
    }
}

impl<'a> Iterator for OpIter<'a> {
    type Item = Result<Op<'a>, PackError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cmd_pos = self.pos;
        let cmd = *self.data.get(self.pos)?;
        self.pos += 1;

        if cmd & 0x80 != 0 {
            let mut offset = 0usize;
            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    match self.byte("copy offset") {
                        Ok(b) => offset |= (b as usize) << (8 * i),
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
            let mut size = 0usize;
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    match self.byte("copy size") {
                        Ok(b) => size |= (b as usize) << (8 * i),
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            Some(Ok(Op::Copy { offset, size }))
        } else if cmd != 0 {
            let n = cmd as usize;
            let Some(bytes) = self.data.get(self.pos..self.pos + n) else {
                return Some(Err(PackError::InvalidDelta {
                    offset: self.pos as u64,
                    reason: "truncated insert data".into(),
                }));
            };
            self.pos += n;
            Some(Ok(Op::Insert(bytes)))
        } else {
            Some(Err(PackError::InvalidDelta {
                offset: cmd_pos as u64,
                reason: "unexpected delta opcode 0".into(),
            }))
        }
    }
}

/// Both size fields, and where the instructions start.
pub(crate) fn read_sizes(delta: &[u8]) -> Result<(usize, usize, usize), PackError> {
    let (source_size, a) = read_varint(delta).ok_or_else(|| PackError::InvalidDelta {
        offset: 0,
        reason: "truncated source size".into(),
    })?;
    let (target_size, b) = read_varint(&delta[a..]).ok_or_else(|| PackError::InvalidDelta {
        offset: a as u64,
        reason: "truncated target size".into(),
    })?;
    Ok((source_size, target_size, a + b))
}

/// Parse a delta into its sizes and operations.
///
/// Returns `(source_size, target_size, ops)`.
pub fn parse_ops(delta: &[u8]) -> Result<(usize, usize, Vec<DeltaOp>), PackError> {
    let (source_size, target_size, start) = read_sizes(delta)?;
    let ops = OpIter::new(delta, start)
        .map(|op| {
            op.map(|op| match op {
                Op::Copy { offset, size } => DeltaOp::Copy { offset, size },
                Op::Insert(bytes) => DeltaOp::Insert(bytes.to_vec()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((source_size, target_size, ops))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        for value in [0usize, 1, 127, 128, 16383, 16384, 1 << 30] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(read_varint(&buf), Some((value, buf.len())));
        }
        assert_eq!(read_varint(&[0x80]), None);
    }

    #[test]
    fn copy_encodes_only_nonzero_bytes() {
        let mut buf = Vec::new();
        encode_op(&mut buf, &DeltaOp::Copy { offset: 0x0100, size: 0x20 });
        assert_eq!(buf, vec![0x80 | 0x02 | 0x10, 0x01, 0x20]);

        buf.clear();
        encode_op(&mut buf, &DeltaOp::Copy { offset: 0, size: COPY_ZERO_SIZE });
        assert_eq!(buf, vec![0x80 | 0x40, 0x01]);
    }

    #[test]
    fn size_zero_copy_means_64k() {
        let delta = [0x80, 0x80, 0x04, 0x80, 0x80, 0x04, 0x80];
        let (src, dst, ops) = parse_ops(&delta).unwrap();
        assert_eq!((src, dst), (0x10000, 0x10000));
        assert_eq!(ops, vec![DeltaOp::Copy { offset: 0, size: 0x10000 }]);
    }

    #[test]
    fn parse_recovers_ops() {
        let ops = vec![
            DeltaOp::Insert(b"head ".to_vec()),
            DeltaOp::Copy { offset: 3, size: 40 },
            DeltaOp::Insert(vec![0xff; MAX_INSERT_SIZE]),
        ];
        let delta = Delta::from_ops(100, 172, ops.clone());
        assert_eq!(parse_ops(delta.data()).unwrap(), (100, 172, ops));
    }

    #[test]
    fn opcode_zero_is_rejected() {
        let err = parse_ops(&[0x05, 0x05, 0x00]).unwrap_err();
        assert!(matches!(err, PackError::InvalidDelta { offset: 2, .. }));
    }

    #[test]
    fn truncated_insert_is_rejected() {
        assert!(parse_ops(&[0x00, 0x05, 0x05, b'a']).is_err());
    }
}
