//! Block index over a delta source and the matching encoder.

use std::collections::HashMap;

use super::{DeltaOp, BLOCK_SIZE, MAX_COPY_SIZE, MAX_INSERT_SIZE};

/// Offsets of every aligned [`BLOCK_SIZE`]-byte block of a source, keyed by
/// the block's bytes.
///
/// Build it once per base and reuse it for every target compared against
/// that base.
#[derive(Debug, Clone, Default)]
pub struct DeltaIndex {
    blocks: HashMap<[u8; BLOCK_SIZE], Vec<usize>>,
    source_len: usize,
}

impl DeltaIndex {
    pub fn new(source: &[u8]) -> Self {
        let mut blocks: HashMap<[u8; BLOCK_SIZE], Vec<usize>> = HashMap::new();
        // Copy offsets are encoded in 32 bits.
        let indexed = source.len().min(u32::MAX as usize);
        for (i, chunk) in source[..indexed].chunks_exact(BLOCK_SIZE).enumerate() {
            let mut key = [0u8; BLOCK_SIZE];
            key.copy_from_slice(chunk);
            blocks.entry(key).or_default().push(i * BLOCK_SIZE);
        }
        Self {
            blocks,
            source_len: source.len(),
        }
    }

    /// Number of distinct blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Encode `target` as operations against `source`, the buffer this index
    /// was built from.
    ///
    /// Every Copy is at most [`MAX_COPY_SIZE`] long and every Insert at most
    /// [`MAX_INSERT_SIZE`].
    pub fn compress(&self, source: &[u8], target: &[u8]) -> Vec<DeltaOp> {
        debug_assert_eq!(source.len(), self.source_len);
        let mut ops = Vec::new();
        let mut pending: Vec<u8> = Vec::with_capacity(MAX_INSERT_SIZE);
        let mut pos = 0;

        while pos < target.len() {
            let Some((mut offset, forward)) = self.longest_match(source, target, pos) else {
                pending.push(target[pos]);
                pos += 1;
                if pending.len() == MAX_INSERT_SIZE {
                    flush_insert(&mut ops, &mut pending);
                }
                continue;
            };

            // `pending` holds exactly the target bytes right before `pos`.
            let mut size = forward;
            while size < MAX_COPY_SIZE
                && offset > 0
                && pending.last() == Some(&source[offset - 1])
            {
                pending.pop();
                offset -= 1;
                size += 1;
            }
            flush_insert(&mut ops, &mut pending);
            ops.push(DeltaOp::Copy { offset, size });
            pos += forward;
        }
        flush_insert(&mut ops, &mut pending);
        ops
    }

    /// Longest forward match for the block starting at `target[pos]`; the
    /// first candidate wins ties.
    ///
    /// Candidates are in ascending offset order, so the longest possible
    /// match only shrinks along the list.
    fn longest_match(&self, source: &[u8], target: &[u8], pos: usize) -> Option<(usize, usize)> {
        let block = target.get(pos..pos + BLOCK_SIZE)?;
        let key: &[u8; BLOCK_SIZE] = block.try_into().ok()?;
        let candidates = self.blocks.get(key)?;

        let mut best: Option<(usize, usize)> = None;
        for &offset in candidates {
            let limit = (source.len() - offset)
                .min(target.len() - pos)
                .min(MAX_COPY_SIZE);
            if best.is_some_and(|(_, best_len)| limit <= best_len) {
                break;
            }
            let len = source[offset..offset + limit]
                .iter()
                .zip(&target[pos..pos + limit])
                .take_while(|(a, b)| a == b)
                .count();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((offset, len));
            }
            if len == limit && limit == MAX_COPY_SIZE {
                break;
            }
        }
        best
    }
}

fn flush_insert(ops: &mut Vec<DeltaOp>, pending: &mut Vec<u8>) {
    if !pending.is_empty() {
        ops.push(DeltaOp::Insert(std::mem::take(pending)));
    }
}
