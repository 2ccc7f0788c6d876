//! Apply deltas to reconstruct objects.

use super::{read_sizes, Op, OpIter};
use crate::PackError;

/// A parsed delta header, ready to be replayed against its base.
///
/// Sizes and every copy range are validated so a hostile delta can never
/// read outside the base or produce more than the declared target size.
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    delta: &'a [u8],
    source_size: usize,
    target_size: usize,
    ops_start: usize,
}

impl<'a> Expander<'a> {
    pub fn new(delta: &'a [u8]) -> Result<Self, PackError> {
        let (source_size, target_size, ops_start) = read_sizes(delta)?;
        Ok(Self {
            delta,
            source_size,
            target_size,
            ops_start,
        })
    }

    pub fn source_size(&self) -> usize {
        self.source_size
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Rebuild the target from `source`.
    pub fn expand(&self, source: &[u8]) -> Result<Vec<u8>, PackError> {
        if source.len() != self.source_size {
            return Err(PackError::InvalidDelta {
                offset: 0,
                reason: format!(
                    "source size mismatch: delta says {}, base is {}",
                    self.source_size,
                    source.len()
                ),
            });
        }

        let mut output = Vec::with_capacity(self.target_size);
        for op in OpIter::new(self.delta, self.ops_start) {
            let chunk = match op? {
                Op::Copy { offset, size } => offset
                    .checked_add(size)
                    .and_then(|end| source.get(offset..end))
                    .ok_or_else(|| PackError::InvalidDelta {
                        offset: output.len() as u64,
                        reason: format!(
                            "copy out of bounds: offset={offset}, size={size}, base_len={}",
                            source.len()
                        ),
                    })?,
                Op::Insert(bytes) => bytes,
            };
            if output.len() + chunk.len() > self.target_size {
                return Err(PackError::InvalidDelta {
                    offset: output.len() as u64,
                    reason: format!("output exceeds declared size {}", self.target_size),
                });
            }
            output.extend_from_slice(chunk);
        }

        if output.len() != self.target_size {
            return Err(PackError::InvalidDelta {
                offset: output.len() as u64,
                reason: format!(
                    "target size mismatch: delta says {}, produced {}",
                    self.target_size,
                    output.len()
                ),
            });
        }
        Ok(output)
    }
}
