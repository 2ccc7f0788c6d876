//! Object database.
//!
//! One lookup interface over the loose store and every pack under
//! `objects/pack`. Reads try loose objects first, then packs; writes always
//! create loose objects. Packs received from elsewhere are installed with
//! [`ObjectDatabase::index_pack`] or exploded with [`ObjectDatabase::unpack`].

pub mod backend;
pub mod config;
pub mod prefix;
mod search;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_object::{Object, ObjectInfo, ObjectType, RawObject};
use git_pack::indexer::{IndexedPack, Indexer};
use git_pack::pack::PackFile;
use git_pack::unpack::{UnpackSummary, Unpacker};
use git_pack::write::{PackSummary, Writer};

pub use backend::OdbBackend;
pub use config::OdbConfig;
pub use error::OdbError;

mod error {
    use git_hash::ObjectId;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(String),

        #[error("ambiguous object name: {prefix} matches {count} objects")]
        Ambiguous { prefix: String, count: usize },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: ObjectId, reason: String },

        #[error("invalid configuration: {0}")]
        Config(#[from] toml::de::Error),

        #[error(transparent)]
        Loose(#[from] git_loose::LooseError),

        #[error(transparent)]
        Pack(#[from] git_pack::PackError),

        #[error(transparent)]
        Io(#[from] std::io::Error),

        #[error("object parse error: {0}")]
        Object(#[from] git_object::ObjectError),

        #[error("hash error: {0}")]
        Hash(#[from] git_hash::HashError),
    }
}

/// The loose store plus the packs found next to it.
pub struct ObjectDatabase {
    loose: LooseObjectStore,
    /// Newest name first; replaced wholesale by `reload`.
    packs: RwLock<Vec<PackFile>>,
    objects_dir: PathBuf,
    config: OdbConfig,
}

impl ObjectDatabase {
    /// Open the database at `objects_dir` with default settings.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_config(objects_dir, OdbConfig::default())
    }

    pub fn open_with_config(
        objects_dir: impl AsRef<Path>,
        config: OdbConfig,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let mut loose = LooseObjectStore::open(&objects_dir);
        loose.set_compression_level(config.loose_compression);
        Self::with_loose(loose, config)
    }

    /// Use an already configured loose store; packs are discovered next to it.
    pub fn with_loose(loose: LooseObjectStore, config: OdbConfig) -> Result<Self, OdbError> {
        let objects_dir = loose.objects_dir().to_path_buf();
        let packs = discover_packs(&objects_dir)?;
        tracing::debug!(dir = %objects_dir.display(), packs = packs.len(), "opened object database");
        Ok(Self {
            loose,
            packs: RwLock::new(packs),
            objects_dir,
            config,
        })
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        search::object_exists(self, oid)
    }

    /// Type and content of `oid`; `None` when no backend has it.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        search::find_raw(self, oid)
    }

    /// Type and size of `oid` without expanding the content where avoidable.
    pub fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        search::find_info(self, oid)
    }

    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        let Some(raw) = self.read_raw(oid)? else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e| OdbError::Corrupt {
            oid: *oid,
            reason: e.to_string(),
        })
    }

    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        prefix::prefix_match(self, prefix)
    }

    /// The single object whose name starts with `prefix`.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        prefix::resolve_prefix(self, prefix)
    }

    /// Store a parsed object as a loose object and return its name.
    pub fn store(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(obj_type, content)?)
    }

    /// Name `obj` would be stored under, without storing it.
    pub fn hash_object(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(obj.compute_oid()?)
    }

    /// Rediscover packs, picking up packs installed since opening.
    pub fn reload(&self) -> Result<(), OdbError> {
        let fresh = discover_packs(&self.objects_dir)?;
        tracing::debug!(packs = fresh.len(), "reloaded packs");
        *self.packs.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }

    /// Write a pack of `objects` to `out`, using the configured pack options.
    pub fn write_pack<W, I>(&self, out: W, objects: I) -> Result<(W, PackSummary), OdbError>
    where
        W: Write,
        I: IntoIterator<Item = (ObjectId, Option<String>)>,
    {
        let mut writer = Writer::new(out, self.config.pack);
        let mut entries = writer.prepare(self, objects)?;
        let summary = writer.write_pack(self, &mut entries)?;
        Ok((writer.into_inner(), summary))
    }

    /// Install a pack stream under `objects/pack` and start serving it.
    pub fn index_pack<R: Read>(&self, input: R) -> Result<IndexedPack, OdbError> {
        let installed = Indexer::new(self.pack_dir()).index_pack(input)?;
        self.reload()?;
        Ok(installed)
    }

    /// Store every object of a pack stream as a loose object.
    pub fn unpack<R: Read>(&mut self, input: R) -> Result<UnpackSummary, OdbError> {
        Ok(Unpacker::new(self).process_pack(input)?)
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    pub fn config(&self) -> &OdbConfig {
        &self.config
    }

    pub fn loose(&self) -> &LooseObjectStore {
        &self.loose
    }

    /// Number of packs currently served.
    pub fn pack_count(&self) -> usize {
        self.packs().len()
    }

    pub(crate) fn packs(&self) -> RwLockReadGuard<'_, Vec<PackFile>> {
        self.packs.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open every `*.pack` in `<objects>/pack`, newest name first. Packs that
/// fail to open are skipped.
fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
    let pack_dir = objects_dir.join("pack");
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&pack_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pack"))
        .collect();
    paths.sort_unstable_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut packs = Vec::with_capacity(paths.len());
    for path in paths {
        match PackFile::open(&path) {
            Ok(pack) => packs.push(pack),
            Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unreadable pack"),
        }
    }
    Ok(packs)
}

#[cfg(test)]
mod tests {
    use git_object::Blob;

    use super::*;

    #[test]
    fn empty_directory_has_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let oid = ObjectId::new([7; 20]);
        assert!(!odb.contains(&oid));
        assert!(odb.read_raw(&oid).unwrap().is_none());
        assert!(odb.read_info(&oid).unwrap().is_none());
        assert_eq!(odb.pack_count(), 0);
    }

    #[test]
    fn store_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let blob = Object::Blob(Blob::new(b"hello".to_vec()));
        let oid = odb.store(&blob).unwrap();
        assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert_eq!(odb.hash_object(&blob).unwrap(), oid);
        assert_eq!(odb.read(&oid).unwrap(), Some(blob));
        assert_eq!(
            odb.read_info(&oid).unwrap(),
            Some(ObjectInfo {
                obj_type: ObjectType::Blob,
                size: 5
            })
        );
    }

    #[test]
    fn injected_rng_store_serves_reads() {
        use rand::SeedableRng;

        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::with_rng(dir.path(), rand::rngs::StdRng::seed_from_u64(9));
        let odb = ObjectDatabase::with_loose(loose, OdbConfig::default()).unwrap();
        assert_eq!(odb.objects_dir(), dir.path());
        let oid = odb.write_raw(ObjectType::Blob, b"seeded").unwrap();
        assert!(odb.contains(&oid));
        assert_eq!(odb.resolve_prefix(&oid.to_hex()[..8]).unwrap(), oid);
    }

    #[test]
    fn unreadable_pack_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pack_dir = dir.path().join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("pack-junk.pack"), b"not a pack").unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        assert_eq!(odb.pack_count(), 0);
    }

    #[test]
    fn config_compression_reaches_loose_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = OdbConfig {
            loose_compression: 0,
            ..OdbConfig::default()
        };
        let odb = ObjectDatabase::open_with_config(dir.path(), config).unwrap();
        let content = vec![b'a'; 4096];
        let oid = odb.write_raw(ObjectType::Blob, &content).unwrap();
        // Level 0 stores the canonical bytes uncompressed.
        let on_disk = std::fs::metadata(odb.loose().object_path(&oid)).unwrap().len();
        assert!(on_disk > 4096);
        assert_eq!(odb.read_raw(&oid).unwrap().unwrap().data, content);
    }
}
