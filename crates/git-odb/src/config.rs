//! Object database configuration, read from TOML.
//!
//! ```toml
//! loose_compression = 1
//!
//! [pack]
//! compression = 9
//! window_size = 10
//! max_depth = 50
//! allow_ofs = true
//! ```
//!
//! Every key is optional.

use std::path::Path;

use git_pack::PackOptions;
use serde::Deserialize;

use crate::OdbError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OdbConfig {
    /// zlib level for new loose objects, 0-9.
    pub loose_compression: u32,
    /// Settings for packs built from this database.
    pub pack: PackOptions,
}

impl Default for OdbConfig {
    fn default() -> Self {
        Self {
            loose_compression: 6,
            pack: PackOptions::default(),
        }
    }
}

impl OdbConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, OdbError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a configuration file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OdbError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(OdbConfig::from_toml_str("").unwrap(), OdbConfig::default());
    }

    #[test]
    fn partial_pack_table_keeps_other_defaults() {
        let config = OdbConfig::from_toml_str("loose_compression = 1\n[pack]\nallow_ofs = true\n").unwrap();
        assert_eq!(config.loose_compression, 1);
        assert!(config.pack.allow_ofs);
        assert_eq!(config.pack.window_size, PackOptions::default().window_size);
        assert_eq!(config.pack.max_depth, 50);
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = OdbConfig::from_toml_str("loose_compression = \"fast\"").unwrap_err();
        assert!(matches!(err, OdbError::Config(_)));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = OdbConfig::load(dir.path().join("odb.toml")).unwrap();
        assert_eq!(config, OdbConfig::default());

        std::fs::write(dir.path().join("odb.toml"), "[pack]\nwindow_size = 0\n").unwrap();
        let config = OdbConfig::load(dir.path().join("odb.toml")).unwrap();
        assert_eq!(config.pack.window_size, 0);
    }
}
