use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use git_hash::{ObjectId, DIGEST_LEN};

use crate::ObjectError;

/// Mode of a tree entry, as written in octal ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// 100644
    Regular,
    /// 100755
    Executable,
    /// 120000
    Symlink,
    /// 160000
    Gitlink,
    /// 40000
    Tree,
}

impl FileMode {
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"100644" => Ok(Self::Regular),
            b"100755" => Ok(Self::Executable),
            b"120000" => Ok(Self::Symlink),
            b"160000" => Ok(Self::Gitlink),
            b"40000" => Ok(Self::Tree),
            _ => Err(ObjectError::InvalidFileMode(BString::from(s))),
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Regular => b"100644",
            Self::Executable => b"100755",
            Self::Symlink => b"120000",
            Self::Gitlink => b"160000",
            Self::Tree => b"40000",
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }
}

/// One named child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<BString>, oid: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }

    pub fn is_subtree(&self) -> bool {
        self.mode.is_tree()
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical tree order: byte order of names, where a subtree compares as
/// if its name ended in `/`.
impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let terminator = |e: &TreeEntry| if e.is_subtree() { b'/' } else { 0 };
        let a = self.name.iter().copied().chain(std::iter::once(terminator(self)));
        let b = other.name.iter().copied().chain(std::iter::once(terminator(other)));
        a.cmp(b)
    }
}

/// A directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a sequence of `<mode> <name>\0<20-byte oid>` records.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < content.len() {
            let rest = &content[pos..];
            let space = rest.find_byte(b' ').ok_or(ObjectError::InvalidTreeEntry {
                offset: pos,
                reason: "missing space after mode",
            })?;
            let mode = FileMode::from_bytes(&rest[..space])?;
            let nul = rest.find_byte(0).ok_or(ObjectError::InvalidTreeEntry {
                offset: pos,
                reason: "missing NUL after name",
            })?;
            if nul <= space + 1 {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "empty name",
                });
            }
            let oid_end = nul + 1 + DIGEST_LEN;
            if oid_end > rest.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "truncated object id",
                });
            }
            entries.push(TreeEntry {
                mode,
                name: BString::from(&rest[space + 1..nul]),
                oid: ObjectId::from_bytes(&rest[nul + 1..oid_end])?,
            });
            pos += oid_end;
        }
        Ok(Self { entries })
    }

    /// Encode with entries in canonical order, regardless of insertion order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort();
        let mut out = Vec::with_capacity(self.entries.len() * (DIGEST_LEN + 16));
        for entry in sorted {
            out.extend_from_slice(entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    /// Insert or replace the entry called `entry.name`.
    pub fn insert(&mut self, entry: TreeEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn sort(&mut self) {
        self.entries.sort();
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(last: u8) -> ObjectId {
        let mut b = [0u8; 20];
        b[19] = last;
        ObjectId::new(b)
    }

    #[test]
    fn subtree_sorts_with_implicit_slash() {
        let dir = TreeEntry::new(FileMode::Tree, "foo", oid(1));
        // '/' > '.' and '/' > '-', but '/' < '0'
        assert_eq!(dir.cmp(&TreeEntry::new(FileMode::Regular, "foo.c", oid(2))), Ordering::Greater);
        assert_eq!(dir.cmp(&TreeEntry::new(FileMode::Regular, "foo-bar", oid(2))), Ordering::Greater);
        assert_eq!(dir.cmp(&TreeEntry::new(FileMode::Regular, "foo0", oid(2))), Ordering::Less);
    }

    #[test]
    fn file_prefix_sorts_first() {
        let short = TreeEntry::new(FileMode::Regular, "foo", oid(1));
        let long = TreeEntry::new(FileMode::Regular, "foo.c", oid(1));
        assert_eq!(short.cmp(&long), Ordering::Less);
    }

    #[test]
    fn serialization_is_order_independent() {
        let a = TreeEntry::new(FileMode::Regular, "b.txt", oid(1));
        let b = TreeEntry::new(FileMode::Tree, "a-dir", oid(2));
        let one = Tree {
            entries: vec![a.clone(), b.clone()],
        };
        let two = Tree {
            entries: vec![b, a],
        };
        assert_eq!(one.serialize_content(), two.serialize_content());

        let parsed = Tree::parse(&one.serialize_content()).unwrap();
        assert_eq!(parsed.entries[0].name, "a-dir");
        assert!(parsed.entries[0].is_subtree());
        assert_eq!(parsed.entries[1].name, "b.txt");
    }

    #[test]
    fn tree_mode_written_without_leading_zero() {
        let tree = Tree {
            entries: vec![TreeEntry::new(FileMode::Tree, "src", oid(3))],
        };
        assert!(tree.serialize_content().starts_with(b"40000 src\0"));
    }

    #[test]
    fn insert_replaces_by_name() {
        let mut tree = Tree::new();
        tree.insert(TreeEntry::new(FileMode::Regular, "a", oid(1)));
        tree.insert(TreeEntry::new(FileMode::Executable, "a", oid(2)));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.find(BStr::new("a")).unwrap().oid, oid(2));
        assert!(tree.find(BStr::new("missing")).is_none());
    }

    #[test]
    fn truncated_entries_rejected() {
        assert!(Tree::parse(b"100644 a\0short").is_err());
        assert!(Tree::parse(b"100644 a").is_err());
        assert!(Tree::parse(b"100644").is_err());
        assert!(Tree::parse(b"123456 a\0aaaaaaaaaaaaaaaaaaaa").is_err());
    }
}
