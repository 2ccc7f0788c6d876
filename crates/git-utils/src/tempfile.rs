//! Uniquely named temp files that become their final file by atomic rename.
//!
//! Names are drawn from a caller-supplied random source so tests can pin
//! them. Creation uses exclusive-create, so two writers never share a temp
//! file even when they pick the same directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::UtilError;
use crate::Result;

/// Number of random characters in a temp name.
pub const RANDOM_LEN: usize = 6;

/// Fresh names tried before giving up on `AlreadyExists`.
pub const MAX_NAME_ATTEMPTS: usize = 16;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// `prefix` followed by [`RANDOM_LEN`] characters from `[A-Za-z0-9]`.
pub fn random_name<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let mut name = String::with_capacity(prefix.len() + RANDOM_LEN);
    name.push_str(prefix);
    for _ in 0..RANDOM_LEN {
        name.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    name
}

/// A temp file that is removed on drop unless persisted.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    file: Option<File>,
    persisted: bool,
}

impl TempFile {
    /// Exclusively create `dir/<prefix><random>`.
    ///
    /// A missing `dir` is created (an existing one is fine) and the open is
    /// retried once. A name that already exists is replaced by a freshly drawn
    /// one, up to [`MAX_NAME_ATTEMPTS`] times.
    pub fn create_in<R: Rng + ?Sized>(dir: &Path, prefix: &str, rng: &mut R) -> Result<Self> {
        let mut created_dir = false;
        let mut attempts = 0;
        let mut path = dir.join(random_name(prefix, rng));
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        file: Some(file),
                        persisted: false,
                    })
                }
                Err(e) if e.kind() == ErrorKind::NotFound && !created_dir => {
                    created_dir = true;
                    fs::create_dir_all(dir)?;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_NAME_ATTEMPTS {
                        return Err(UtilError::TempNameExhausted {
                            dir: dir.to_path_buf(),
                            attempts,
                        });
                    }
                    tracing::trace!(path = %path.display(), "temp name taken, drawing another");
                    path = dir.join(random_name(prefix, rng));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the handle and rename onto `target`, replacing any file there.
    pub fn persist(mut self, target: &Path) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        fs::rename(&self.path, target).map_err(|source| UtilError::Rename {
            from: self.path.clone(),
            to: target.to_path_buf(),
            source,
        })?;
        self.persisted = true;
        Ok(())
    }

    /// Make the file read-only for everyone (0444). No-op off Unix.
    pub fn set_readonly(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o444))?;
        }
        Ok(())
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already closed"))
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            self.file.take();
            let _ = fs::remove_file(&self.path);
        }
    }
}
