use crate::{HashError, ObjectId};

/// Number of bytes the table occupies on disk.
pub const FANOUT_BYTES: usize = 256 * 4;

/// Cumulative first-byte counts over a sorted OID table.
///
/// `get(b)` is the number of names whose first byte is `<= b`, so the names
/// starting with `b` occupy `range(b)` in the sorted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTable {
    table: [u32; 256],
}

impl FanoutTable {
    /// Build from names sorted ascending.
    pub fn build(sorted: &[ObjectId]) -> Self {
        let mut table = [0u32; 256];
        for oid in sorted {
            table[oid.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            table[i] += table[i - 1];
        }
        Self { table }
    }

    pub fn range(&self, first_byte: u8) -> std::ops::Range<usize> {
        let end = self.table[first_byte as usize] as usize;
        let start = match first_byte {
            0 => 0,
            b => self.table[b as usize - 1] as usize,
        };
        start..end
    }

    pub fn total(&self) -> u32 {
        self.table[255]
    }

    pub fn get(&self, index: u8) -> u32 {
        self.table[index as usize]
    }

    /// Parse 256 big-endian counts and reject a decreasing sequence.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HashError> {
        if data.len() < FANOUT_BYTES {
            return Err(HashError::InvalidHashLength {
                expected: FANOUT_BYTES,
                actual: data.len(),
            });
        }
        let mut table = [0u32; 256];
        for (entry, chunk) in table.iter_mut().zip(data[..FANOUT_BYTES].chunks_exact(4)) {
            *entry = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        if let Some(bucket) = (1..256).find(|&i| table[i] < table[i - 1]) {
            return Err(HashError::NonMonotonicFanout { bucket });
        }
        Ok(Self { table })
    }

    pub fn to_bytes(&self) -> [u8; FANOUT_BYTES] {
        let mut buf = [0u8; FANOUT_BYTES];
        for (chunk, count) in buf.chunks_exact_mut(4).zip(self.table.iter()) {
            chunk.copy_from_slice(&count.to_be_bytes());
        }
        buf
    }
}
