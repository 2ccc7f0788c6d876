//! Sequential pack record reader.

use std::io::Read;

use flate2::{Decompress, FlushDecompress, Status};
use git_hash::ObjectId;
use git_object::RawObject;

use crate::delta::read_varint;
use crate::entry::{decode_entry_header, EntryHeader};
use crate::stream::Stream;
use crate::{PackEntryType, PackError, PACK_SIGNATURE, PACK_VERSION};

/// Input is handed to the inflater in chunks of this size; it must not
/// exceed [`crate::stream::LOOKBACK`].
const INFLATE_CHUNK: usize = 4096;

/// Enough inflated bytes for the two size varints of any delta.
const DELTA_SIZES_PREFIX: usize = 20;

/// One record as stored in the pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Object(RawObject),
    RefDelta { base_oid: ObjectId, delta: Vec<u8> },
    OfsDelta { base_offset: u64, delta: Vec<u8> },
}

/// Header-level facts about a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub entry_type: PackEntryType,
    /// Size of the object the record decodes to; for deltas the declared
    /// target size.
    pub size: usize,
}

/// Reads a pack front to back.
pub struct Reader<R> {
    stream: Stream<R>,
}

impl<R: Read> Reader<R> {
    /// Read a complete pack stream starting at offset 0, checksumming it.
    pub fn new(input: R) -> Self {
        Self {
            stream: Stream::new(input),
        }
    }

    pub fn from_stream(stream: Stream<R>) -> Self {
        Self { stream }
    }

    pub fn stream_mut(&mut self) -> &mut Stream<R> {
        &mut self.stream
    }

    pub fn into_stream(self) -> Stream<R> {
        self.stream
    }

    /// Absolute offset of the next record.
    pub fn offset(&self) -> u64 {
        self.stream.offset()
    }

    /// Validate signature and version; returns the object count.
    pub fn read_header(&mut self) -> Result<u32, PackError> {
        let mut header = [0u8; 12];
        self.stream.read_exact_or_eof(&mut header)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        Ok(u32::from_be_bytes([header[8], header[9], header[10], header[11]]))
    }

    /// Decode the header of the record at the current offset.
    pub fn read_entry_header(&mut self) -> Result<EntryHeader, PackError> {
        let offset = self.stream.offset();
        let stream = &mut self.stream;
        decode_entry_header(offset, || stream.read_byte())
    }

    /// Read the next record and the offset it started at.
    pub fn read_record(&mut self) -> Result<(u64, Record), PackError> {
        let offset = self.stream.offset();
        let header = self.read_entry_header()?;
        let body = self.inflate(header.size, offset)?;
        let record = match header.entry_type {
            PackEntryType::OfsDelta { base_offset } => Record::OfsDelta {
                base_offset,
                delta: body,
            },
            PackEntryType::RefDelta { base_oid } => Record::RefDelta {
                base_oid,
                delta: body,
            },
            whole => {
                let obj_type = whole
                    .to_object_type()
                    .ok_or(PackError::CorruptEntry(offset))?;
                Record::Object(RawObject::new(obj_type, body))
            }
        };
        tracing::trace!(offset, kind = ?header.entry_type, size = header.size, "read pack record");
        Ok((offset, record))
    }

    /// Type and decoded size of the next record without inflating whole
    /// bodies. The stream is left inside the record.
    pub fn read_info(&mut self) -> Result<RecordInfo, PackError> {
        let offset = self.stream.offset();
        let header = self.read_entry_header()?;
        let size = if header.entry_type.is_delta() {
            let prefix = self.inflate_prefix(DELTA_SIZES_PREFIX.min(header.size), offset)?;
            let (_, used) = read_varint(&prefix).ok_or(PackError::CorruptEntry(offset))?;
            let (target_size, _) =
                read_varint(&prefix[used..]).ok_or(PackError::CorruptEntry(offset))?;
            target_size
        } else {
            header.size
        };
        Ok(RecordInfo {
            entry_type: header.entry_type,
            size,
        })
    }

    /// Read the trailer and check it against everything read so far.
    pub fn verify_checksum(&mut self) -> Result<ObjectId, PackError> {
        self.stream.verify_checksum()
    }

    /// Inflate one zlib stream that must produce exactly `expected` bytes.
    /// Input the inflater did not consume is pushed back.
    fn inflate(&mut self, expected: usize, offset: u64) -> Result<Vec<u8>, PackError> {
        let mut z = Decompress::new(true);
        let mut out = Vec::with_capacity(expected);
        let mut input = [0u8; INFLATE_CHUNK];

        loop {
            let n = self.stream.read(&mut input)?;
            let mut used = 0;
            loop {
                if out.len() == out.capacity() {
                    out.reserve(INFLATE_CHUNK);
                }
                let in_before = z.total_in();
                let out_before = z.total_out();
                let status = z
                    .decompress_vec(&input[used..n], &mut out, FlushDecompress::None)
                    .map_err(|_| PackError::CorruptEntry(offset))?;
                used += (z.total_in() - in_before) as usize;
                let progressed = z.total_in() != in_before || z.total_out() != out_before;

                if out.len() > expected {
                    return Err(PackError::CorruptEntry(offset));
                }
                if status == Status::StreamEnd {
                    self.stream.seek_back(n - used)?;
                    if out.len() != expected {
                        return Err(PackError::CorruptEntry(offset));
                    }
                    return Ok(out);
                }
                if !progressed {
                    if n == 0 {
                        return Err(PackError::UnexpectedEof);
                    }
                    if used == n {
                        break;
                    }
                    return Err(PackError::CorruptEntry(offset));
                }
                if used == n && out.len() < out.capacity() {
                    break;
                }
            }
        }
    }

    /// Up to `limit` leading bytes of a zlib body.
    fn inflate_prefix(&mut self, limit: usize, offset: u64) -> Result<Vec<u8>, PackError> {
        let mut z = Decompress::new(true);
        let mut out = Vec::with_capacity(limit);
        let mut input = [0u8; 64];

        while out.len() < limit {
            let n = self.stream.read(&mut input)?;
            let mut used = 0;
            loop {
                let in_before = z.total_in();
                let out_before = z.total_out();
                let status = z
                    .decompress_vec(&input[used..n], &mut out, FlushDecompress::None)
                    .map_err(|_| PackError::CorruptEntry(offset))?;
                used += (z.total_in() - in_before) as usize;
                if status == Status::StreamEnd || out.len() >= limit {
                    self.stream.seek_back(n - used)?;
                    return Ok(out);
                }
                if z.total_in() == in_before && z.total_out() == out_before {
                    if n == 0 {
                        return Err(PackError::UnexpectedEof);
                    }
                    break;
                }
                if used == n {
                    break;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use git_hash::hasher::Hasher;
    use git_object::ObjectType;

    use super::*;
    use crate::delta::Delta;
    use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
    use crate::{OFS_DELTA, REF_DELTA};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn pack(records: &[Vec<u8>]) -> Vec<u8> {
        let mut data = b"PACK".to_vec();
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&(records.len() as u32).to_be_bytes());
        for r in records {
            data.extend_from_slice(r);
        }
        let checksum = Hasher::digest(&data).unwrap();
        data.extend_from_slice(checksum.as_bytes());
        data
    }

    fn whole(type_num: u8, body: &[u8]) -> Vec<u8> {
        let mut r = encode_entry_header(type_num, body.len() as u64);
        r.extend(deflate(body));
        r
    }

    #[test]
    fn reads_records_in_order() {
        let base = b"base content, long enough to carry a delta against it".to_vec();
        let target = b"base content, long enough to carry a delta against it!".to_vec();
        let delta = Delta::new(&base, &target);
        let base_oid = Hasher::hash_object("blob", &base).unwrap();

        let first = whole(3, &base);
        let mut ofs = encode_entry_header(OFS_DELTA, delta.size() as u64);
        ofs.extend(encode_ofs_delta_offset(first.len() as u64));
        ofs.extend(deflate(delta.data()));
        let mut refd = encode_entry_header(REF_DELTA, delta.size() as u64);
        refd.extend_from_slice(base_oid.as_bytes());
        refd.extend(deflate(delta.data()));
        let data = pack(&[first.clone(), ofs.clone(), refd]);

        let mut reader = Reader::new(&data[..]);
        assert_eq!(reader.read_header().unwrap(), 3);

        let (offset, record) = reader.read_record().unwrap();
        assert_eq!(offset, 12);
        assert_eq!(record, Record::Object(RawObject::new(ObjectType::Blob, base)));

        let (offset, record) = reader.read_record().unwrap();
        assert_eq!(offset, 12 + first.len() as u64);
        assert_eq!(
            record,
            Record::OfsDelta {
                base_offset: 12,
                delta: delta.data().to_vec()
            }
        );

        let (offset, record) = reader.read_record().unwrap();
        assert_eq!(offset, 12 + (first.len() + ofs.len()) as u64);
        assert_eq!(
            record,
            Record::RefDelta {
                base_oid,
                delta: delta.data().to_vec()
            }
        );
        reader.verify_checksum().unwrap();
    }

    #[test]
    fn record_info_reports_delta_target_size() {
        let base = vec![b'a'; 200];
        let mut target = base.clone();
        target.extend_from_slice(b"more");
        let delta = Delta::new(&base, &target);
        let mut rec = encode_entry_header(REF_DELTA, delta.size() as u64);
        rec.extend_from_slice(&[1u8; 20]);
        rec.extend(deflate(delta.data()));
        let data = pack(&[rec]);

        let mut reader = Reader::new(&data[..]);
        reader.read_header().unwrap();
        let info = reader.read_info().unwrap();
        assert_eq!(info.size, 204);
        assert!(info.entry_type.is_delta());
    }

    #[test]
    fn declared_size_must_match() {
        for (declared, body) in [(20u64, &b"too short"[..]), (4, &b"longer than four"[..])] {
            let mut rec = encode_entry_header(3, declared);
            rec.extend(deflate(body));
            let data = pack(&[rec]);
            let mut reader = Reader::new(&data[..]);
            reader.read_header().unwrap();
            assert!(matches!(reader.read_record(), Err(PackError::CorruptEntry(12))));
        }
    }

    #[test]
    fn bad_signature_and_version() {
        let mut data = pack(&[]);
        data[0] = b'K';
        assert!(matches!(
            Reader::new(&data[..]).read_header(),
            Err(PackError::InvalidHeader(_))
        ));

        let mut data = pack(&[]);
        data[7] = 3;
        assert!(matches!(
            Reader::new(&data[..]).read_header(),
            Err(PackError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn truncated_body_is_eof() {
        let mut rec = whole(3, &vec![b'q'; 5000]);
        rec.truncate(rec.len() / 2);
        let mut data = b"PACK\0\0\0\x02\0\0\0\x01".to_vec();
        data.extend(rec);
        let mut reader = Reader::new(&data[..]);
        reader.read_header().unwrap();
        assert!(reader.read_record().is_err());
    }
}
