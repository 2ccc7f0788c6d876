use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git_hash::hex::is_hex_prefix;
use git_hash::ObjectId;

use crate::{LooseError, LooseObjectStore};

/// Names of all loose objects, fan-out directory by fan-out directory.
///
/// Temp files and anything else that is not a 38-character hex name are
/// skipped.
pub struct LooseObjectIter {
    dirs: std::vec::IntoIter<(String, PathBuf)>,
    current: std::vec::IntoIter<ObjectId>,
}

impl LooseObjectIter {
    fn new(objects_dir: &Path) -> Result<Self, LooseError> {
        let mut dirs = Vec::new();
        match fs::read_dir(objects_dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
                    if name.len() == 2 && is_hex_prefix(&name) && entry.file_type()?.is_dir() {
                        dirs.push((name, entry.path()));
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        dirs.sort();
        Ok(Self {
            dirs: dirs.into_iter(),
            current: Vec::new().into_iter(),
        })
    }
}

/// Objects stored in one fan-out directory, sorted.
fn list_fanout(prefix: &str, dir: &Path) -> Result<Vec<ObjectId>, LooseError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut oids = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.len() != 38 {
            continue;
        }
        if let Ok(oid) = ObjectId::from_hex(&format!("{prefix}{name}")) {
            oids.push(oid);
        }
    }
    oids.sort();
    Ok(oids)
}

impl Iterator for LooseObjectIter {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(oid) = self.current.next() {
                return Some(Ok(oid));
            }
            let (prefix, dir) = self.dirs.next()?;
            match list_fanout(&prefix, &dir) {
                Ok(oids) => self.current = oids.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl LooseObjectStore {
    /// Every loose object, in name order.
    pub fn iter(&self) -> Result<LooseObjectIter, LooseError> {
        LooseObjectIter::new(&self.objects_dir)
    }

    /// Loose objects whose hex name starts with `prefix` (case-insensitive).
    ///
    /// Prefixes of two or more characters list a single fan-out directory;
    /// shorter ones scan them all.
    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, LooseError> {
        if !is_hex_prefix(prefix) {
            return Ok(Vec::new());
        }
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() >= 2 {
            let bucket = &prefix[..2];
            let found = list_fanout(bucket, &self.objects_dir.join(bucket))?;
            return Ok(found
                .into_iter()
                .filter(|oid| oid.starts_with_hex(&prefix))
                .collect());
        }
        let mut found = Vec::new();
        for oid in self.iter()? {
            let oid = oid?;
            if oid.starts_with_hex(&prefix) {
                found.push(oid);
            }
        }
        Ok(found)
    }
}
