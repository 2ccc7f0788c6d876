//! Object model: blob, tree and commit values.
//!
//! Every object has one canonical encoding, `"<type> <len>\0<content>"`, which
//! is both what gets hashed into its [`ObjectId`] and what a loose object file
//! stores. [`RawObject`] carries undecoded content between the stores and the
//! pack format; [`Object`] is the parsed form.

mod blob;
mod commit;
pub mod header;
mod signature;
mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use signature::Signature;
pub use tree::{FileMode, Tree, TreeEntry};

use bstr::BString;
use git_hash::hasher::Hasher;
use git_hash::{HashError, ObjectId};

/// Errors produced by object operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("object size mismatch: header declares {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: &'static str },

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(BString),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The kinds of object the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// Type and size of an object, without its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// An object's type and undecoded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(obj_type: ObjectType, data: Vec<u8>) -> Self {
        Self { obj_type, data }
    }

    /// Split a canonical encoding into type and content, checking the declared size.
    pub fn from_canonical(encoded: &[u8]) -> Result<Self, ObjectError> {
        let (obj_type, size, header_len) = header::parse_header(encoded)?;
        let content = &encoded[header_len..];
        if content.len() != size {
            return Err(ObjectError::SizeMismatch {
                expected: size,
                actual: content.len(),
            });
        }
        Ok(Self::new(obj_type, content.to_vec()))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            obj_type: self.obj_type,
            size: self.data.len(),
        }
    }

    /// Header followed by content.
    pub fn canonical(&self) -> Vec<u8> {
        let mut out = header::write_header(self.obj_type, self.data.len());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn compute_oid(&self) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.obj_type.as_str(), &self.data)
    }

    pub fn parse(&self) -> Result<Object, ObjectError> {
        Object::parse_content(self.obj_type, &self.data)
    }
}

/// A parsed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    /// Parse a canonical encoding (header + content).
    pub fn parse(encoded: &[u8]) -> Result<Self, ObjectError> {
        RawObject::from_canonical(encoded)?.parse()
    }

    pub fn parse_content(obj_type: ObjectType, content: &[u8]) -> Result<Self, ObjectError> {
        Ok(match obj_type {
            ObjectType::Blob => Self::Blob(Blob::parse(content)),
            ObjectType::Tree => Self::Tree(Tree::parse(content)?),
            ObjectType::Commit => Self::Commit(Commit::parse(content)?),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
        }
    }

    /// Content without header. Tree entries come out in canonical order.
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.serialize_content(),
            Self::Commit(c) => c.serialize_content(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_raw().canonical()
    }

    pub fn to_raw(&self) -> RawObject {
        RawObject::new(self.object_type(), self.serialize_content())
    }

    pub fn compute_oid(&self) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.object_type().as_str(), &self.serialize_content())
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}
