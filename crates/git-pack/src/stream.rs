//! Byte source for pack parsing.
//!
//! Inflating a record body needs to read ahead; whatever the inflater did not
//! consume is handed back with [`Stream::seek_back`]. To make that possible
//! the stream keeps the most recently consumed bytes in a bounded lookback
//! ring, and only feeds a byte into the running pack checksum once it has
//! left the ring and can no longer be un-read.

use std::collections::VecDeque;
use std::io::{self, Read};

use git_hash::hasher::Hasher;
use git_hash::{ObjectId, DIGEST_LEN};

use crate::PackError;

/// Bytes retained for [`Stream::seek_back`].
pub const LOOKBACK: usize = 8192;

pub struct Stream<R> {
    inner: R,
    offset: u64,
    /// Un-read bytes, next byte last.
    pushback: Vec<u8>,
    lookback: VecDeque<u8>,
    hasher: Option<Hasher>,
    capture: Option<Vec<u8>>,
}

impl<R: Read> Stream<R> {
    /// A stream at offset 0 whose consumed bytes feed the pack checksum.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            pushback: Vec::new(),
            lookback: VecDeque::with_capacity(LOOKBACK),
            hasher: Some(Hasher::new()),
            capture: None,
        }
    }

    /// A stream positioned at absolute pack offset `start`, without a
    /// checksum. Used for random access into an already verified pack.
    pub fn unhashed_at(inner: R, start: u64) -> Self {
        Self {
            inner,
            offset: start,
            pushback: Vec::new(),
            lookback: VecDeque::new(),
            hasher: None,
            capture: None,
        }
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes currently available to [`seek_back`](Self::seek_back).
    pub fn retained(&self) -> usize {
        self.lookback.len()
    }

    /// Un-read the last `n` consumed bytes.
    pub fn seek_back(&mut self, n: usize) -> Result<(), PackError> {
        if n > self.lookback.len() {
            return Err(PackError::SeekOutOfRange {
                requested: n,
                available: self.lookback.len(),
            });
        }
        for _ in 0..n {
            if let Some(b) = self.lookback.pop_back() {
                self.pushback.push(b);
            }
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.truncate(capture.len().saturating_sub(n));
        }
        self.offset -= n as u64;
        Ok(())
    }

    /// Start recording every consumed byte.
    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stop recording and return the bytes consumed since
    /// [`begin_capture`](Self::begin_capture), net of any seek back.
    pub fn end_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }

    pub fn read_byte(&mut self) -> Result<u8, PackError> {
        let mut b = [0u8; 1];
        self.read_exact_or_eof(&mut b)?;
        Ok(b[0])
    }

    /// Fill `buf` completely, reporting a short input as
    /// [`PackError::UnexpectedEof`].
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<(), PackError> {
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PackError::UnexpectedEof,
            _ => PackError::Io(e),
        })
    }

    /// Read the 20-byte trailer and compare it with the SHA-1 of everything
    /// consumed before it. The trailer itself is not hashed.
    pub fn verify_checksum(&mut self) -> Result<ObjectId, PackError> {
        let mut hasher = self.hasher.take().ok_or(PackError::NotHashed)?;
        let (front, back) = self.lookback.as_slices();
        hasher.update(front);
        hasher.update(back);
        self.lookback.clear();
        let actual = hasher.finalize()?;

        let mut trailer = [0u8; DIGEST_LEN];
        let mut filled = 0;
        while filled < trailer.len() {
            let n = self.read_untracked(&mut trailer[filled..])?;
            if n == 0 {
                return Err(PackError::UnexpectedEof);
            }
            filled += n;
        }
        self.offset += DIGEST_LEN as u64;
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(&trailer);
        }

        let expected = ObjectId::new(trailer);
        if expected != actual {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(actual)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Pushback first, then the underlying reader. Nothing is recorded.
    fn read_untracked(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pushback.is_empty() {
            return self.inner.read(buf);
        }
        let n = buf.len().min(self.pushback.len());
        let start = self.pushback.len() - n;
        for (slot, b) in buf.iter_mut().zip(self.pushback.drain(start..).rev()) {
            *slot = b;
        }
        Ok(n)
    }

    fn record(&mut self, bytes: &[u8]) {
        self.offset += bytes.len() as u64;
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(bytes);
        }
        self.lookback.extend(bytes);
        let excess = self.lookback.len().saturating_sub(LOOKBACK);
        if excess == 0 {
            return;
        }
        if let Some(hasher) = self.hasher.as_mut() {
            let (front, back) = self.lookback.as_slices();
            let from_front = excess.min(front.len());
            hasher.update(&front[..from_front]);
            hasher.update(&back[..excess - from_front]);
        }
        self.lookback.drain(..excess);
    }
}

impl<R: Read> Read for Stream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_untracked(buf)?;
        self.record(&buf[..n]);
        Ok(n)
    }
}
