use bstr::{BString, ByteSlice};

use crate::ObjectError;

/// An identity line: `Name <email> <unix-seconds> <+HHMM>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub time: i64,
    /// Offset from UTC in minutes.
    pub tz_offset: i32,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, time: i64, tz_offset: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
            tz_offset,
        }
    }

    pub fn parse(input: &[u8]) -> Result<Self, ObjectError> {
        let bad = |why: &str| ObjectError::InvalidSignature(format!("{why}: {:?}", input.as_bstr()));

        let gt = input.rfind_byte(b'>').ok_or_else(|| bad("missing '>'"))?;
        let lt = input[..gt].rfind_byte(b'<').ok_or_else(|| bad("missing '<'"))?;
        let name = input[..lt].trim_end();
        let email = &input[lt + 1..gt];

        let mut fields = input[gt + 1..].fields();
        let time = fields
            .next()
            .and_then(|t| t.to_str().ok()?.parse::<i64>().ok())
            .ok_or_else(|| bad("invalid timestamp"))?;
        let tz = fields.next().ok_or_else(|| bad("missing timezone"))?;
        let tz_offset = parse_tz(tz).ok_or_else(|| bad("invalid timezone"))?;

        Ok(Self::new(name, email, time, tz_offset))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        let sign = if self.tz_offset < 0 { '-' } else { '+' };
        let minutes = self.tz_offset.unsigned_abs();
        out.extend_from_slice(
            format!("{} {}{:02}{:02}", self.time, sign, minutes / 60, minutes % 60).as_bytes(),
        );
        out
    }
}

/// `+HHMM` / `-HHMM` to signed minutes.
fn parse_tz(tz: &[u8]) -> Option<i32> {
    if tz.len() != 5 || !tz[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match tz[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digit = |i: usize| i32::from(tz[i] - b'0');
    let hours = digit(1) * 10 + digit(2);
    let minutes = digit(3) * 10 + digit(4);
    Some(sign * (hours * 60 + minutes))
}
