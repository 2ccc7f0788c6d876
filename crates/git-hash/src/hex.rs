use crate::{HashError, DIGEST_LEN, HEX_LEN};

/// ASCII byte to nibble value, 0xff marks a non-hex byte.
const NIBBLE: [u8; 256] = {
    let mut table = [0xffu8; 256];
    let mut i = 0usize;
    while i < 256 {
        let c = i as u8;
        table[i] = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => 0xff,
        };
        i += 1;
    }
    table
};

const DIGITS: &[u8; 16] = b"0123456789abcdef";

fn nibble(hex: &[u8], position: usize) -> Result<u8, HashError> {
    match NIBBLE[hex[position] as usize] {
        0xff => Err(HashError::InvalidHex {
            position,
            character: hex[position] as char,
        }),
        v => Ok(v),
    }
}

/// Encode `bytes` as lowercase hex.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Decode a hex string into `buf`; the string must be exactly `buf.len() * 2` long.
pub fn decode_into(hex: &str, buf: &mut [u8]) -> Result<(), HashError> {
    let hex = hex.as_bytes();
    if hex.len() != buf.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: buf.len() * 2,
            actual: hex.len(),
        });
    }
    for (i, out) in buf.iter_mut().enumerate() {
        *out = (nibble(hex, i * 2)? << 4) | nibble(hex, i * 2 + 1)?;
    }
    Ok(())
}

/// Decode an even-length hex string.
pub fn decode(hex: &str) -> Result<Vec<u8>, HashError> {
    if hex.len() % 2 != 0 {
        return Err(HashError::InvalidHexLength {
            expected: hex.len() + 1,
            actual: hex.len(),
        });
    }
    let mut buf = vec![0u8; hex.len() / 2];
    decode_into(hex, &mut buf)?;
    Ok(buf)
}

/// Decode an abbreviated object name into a zero-padded digest.
///
/// Any length from 0 to 40 is accepted. An odd trailing nibble fills the high
/// half of its byte, so the result is the smallest digest carrying the prefix.
pub fn decode_prefix(prefix: &str) -> Result<[u8; DIGEST_LEN], HashError> {
    let hex = prefix.as_bytes();
    if hex.len() > HEX_LEN {
        return Err(HashError::InvalidHexLength {
            expected: HEX_LEN,
            actual: hex.len(),
        });
    }
    let mut out = [0u8; DIGEST_LEN];
    for i in 0..hex.len() {
        let v = nibble(hex, i)?;
        if i % 2 == 0 {
            out[i / 2] = v << 4;
        } else {
            out[i / 2] |= v;
        }
    }
    Ok(out)
}

/// True when `s` is a usable object-name prefix (hex digits, at most 40).
pub fn is_hex_prefix(s: &str) -> bool {
    s.len() <= HEX_LEN && s.bytes().all(|b| NIBBLE[b as usize] != 0xff)
}
