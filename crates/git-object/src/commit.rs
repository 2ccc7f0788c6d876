use bstr::{BString, ByteSlice};
use git_hash::ObjectId;

use crate::{ObjectError, Signature};

/// A snapshot: root tree, parents, identities and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// In order; empty for a root commit.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Headers other than the four above (`encoding`, `gpgsig`, ...), kept
    /// in order so a parsed commit re-encodes to the same bytes. Values may
    /// span lines.
    pub extra_headers: Vec<(BString, BString)>,
    pub message: BString,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<BString>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let (headers, message) = split_headers(content);

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();

        for (key, value) in headers {
            match key {
                b"tree" if tree.is_none() => tree = Some(parse_oid(value)?),
                b"parent" => parents.push(parse_oid(value)?),
                b"author" if author.is_none() => author = Some(Signature::parse(value)?),
                b"committer" if committer.is_none() => {
                    committer = Some(Signature::parse(value)?)
                }
                _ => extra_headers.push((BString::from(key), unfold(value))),
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            extra_headers,
            message: BString::from(message),
        })
    }

    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        push_header(&mut out, b"tree", self.tree.to_hex().as_bytes());
        for parent in &self.parents {
            push_header(&mut out, b"parent", parent.to_hex().as_bytes());
        }
        push_header(&mut out, b"author", &self.author.to_bytes());
        push_header(&mut out, b"committer", &self.committer.to_bytes());
        for (key, value) in &self.extra_headers {
            push_header(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Split the header block into `(key, raw value)` pairs and return the message.
///
/// A raw value still contains the `\n ` of continuation lines.
fn split_headers(content: &[u8]) -> (Vec<(&[u8], &[u8])>, &[u8]) {
    let mut headers = Vec::new();
    let mut pos = 0;
    while pos < content.len() && content[pos] != b'\n' {
        let mut end = content[pos..]
            .find_byte(b'\n')
            .map_or(content.len(), |i| pos + i);
        while end + 1 < content.len() && content[end + 1] == b' ' {
            end = content[end + 1..]
                .find_byte(b'\n')
                .map_or(content.len(), |i| end + 1 + i);
        }
        let line = &content[pos..end];
        match line.find_byte(b' ') {
            Some(sp) => headers.push((&line[..sp], &line[sp + 1..])),
            None => headers.push((line, &line[line.len()..])),
        }
        pos = end + 1;
    }
    let message = content.get(pos + 1..).unwrap_or_default();
    (headers, message)
}

fn unfold(value: &[u8]) -> BString {
    BString::from(value.replace(b"\n ", b"\n"))
}

fn push_header(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    out.extend_from_slice(&value.replace(b"\n", b"\n "));
    out.push(b'\n');
}

fn parse_oid(value: &[u8]) -> Result<ObjectId, ObjectError> {
    let hex = value
        .to_str()
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII object id".into()))?;
    Ok(ObjectId::from_hex(hex)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
parent 0000000000000000000000000000000000000001\n\
author John Doe <john@example.com> 1234567890 +0000\n\
committer Jane Doe <jane@example.com> 1234567890 +0100\n\
\n\
Initial commit\n";

    #[test]
    fn parse_fields() {
        let commit = Commit::parse(SAMPLE).unwrap();
        assert_eq!(commit.tree.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.author.name, "John Doe");
        assert_eq!(commit.committer.tz_offset, 60);
        assert_eq!(commit.message, "Initial commit\n");
        assert!(!commit.is_root());
    }

    #[test]
    fn reencodes_byte_for_byte() {
        assert_eq!(Commit::parse(SAMPLE).unwrap().serialize_content(), SAMPLE);
    }

    #[test]
    fn multiline_header_survives() {
        let data = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@b.c> 1 +0000\n\
committer A <a@b.c> 1 +0000\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n \n abc\n -----END PGP SIGNATURE-----\n\
\n\
signed\n";
        let commit = Commit::parse(data).unwrap();
        assert_eq!(commit.extra_headers.len(), 1);
        assert_eq!(commit.extra_headers[0].0, "gpgsig");
        assert!(commit.extra_headers[0].1.ends_with(b"\nabc\n-----END PGP SIGNATURE-----"));
        assert_eq!(commit.serialize_content(), data);
    }

    #[test]
    fn empty_message() {
        let data = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@b.c> 1 +0000\n\
committer A <a@b.c> 1 +0000\n\
\n";
        let commit = Commit::parse(data).unwrap();
        assert!(commit.message.is_empty());
        assert!(commit.is_root());
        assert_eq!(commit.serialize_content(), data);
    }

    #[test]
    fn missing_tree() {
        let data = b"author A <a@b.c> 1 +0000\ncommitter A <a@b.c> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::parse(data).unwrap_err(),
            ObjectError::MissingCommitField { field: "tree" }
        ));
    }
}
