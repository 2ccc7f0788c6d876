use crate::{ObjectError, ObjectType};

/// Longest header the store will parse: `"commit "`, 20 digits, NUL.
pub const MAX_HEADER_LEN: usize = 32;

/// Parse `"<type> <size>\0"` at the start of `data`.
///
/// Returns `(type, content_size, header_len)`, where `header_len` counts the NUL.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .take(MAX_HEADER_LEN)
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;
    let header = &data[..nul];
    let space = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space".into()))?;

    let obj_type = ObjectType::from_bytes(&header[..space])?;
    let digits = &header[space + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ObjectError::InvalidHeader(format!(
            "invalid size {:?}",
            String::from_utf8_lossy(digits)
        )));
    }
    let size = digits.iter().try_fold(0usize, |acc, &d| {
        acc.checked_mul(10)?.checked_add(usize::from(d - b'0'))
    });
    let size = size.ok_or_else(|| ObjectError::InvalidHeader("size overflows".into()))?;
    Ok((obj_type, size, nul + 1))
}

pub fn write_header(obj_type: ObjectType, content_size: usize) -> Vec<u8> {
    format!("{obj_type} {content_size}\0").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_header() {
        let data = b"blob 12\0hello world!";
        let (ty, size, len) = parse_header(data).unwrap();
        assert_eq!((ty, size, len), (ObjectType::Blob, 12, 8));
        assert_eq!(&data[len..], b"hello world!");
    }

    #[test]
    fn written_header_parses() {
        let hdr = write_header(ObjectType::Commit, 256);
        assert_eq!(hdr, b"commit 256\0");
        assert_eq!(
            parse_header(&hdr).unwrap(),
            (ObjectType::Commit, 256, hdr.len())
        );
    }

    #[test]
    fn malformed_headers() {
        assert!(parse_header(b"blob 12").is_err());
        assert!(parse_header(b"blob12\0").is_err());
        assert!(parse_header(b"tag 12\0").is_err());
        assert!(parse_header(b"blob abc\0").is_err());
        assert!(parse_header(b"blob \0").is_err());
        assert!(parse_header(b"blob -1\0").is_err());
        assert!(parse_header(b"blob 99999999999999999999999\0").is_err());
    }
}
