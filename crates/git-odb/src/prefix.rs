//! Abbreviated names: short hex → full OID with ambiguity detection.

use git_hash::hex::is_hex_prefix;
use git_hash::{ObjectId, HEX_LEN};

use crate::backend::OdbBackend;
use crate::{ObjectDatabase, OdbError};

/// Shorter prefixes never resolve to a single object.
pub const MINIMUM_ABBREV: usize = 4;

/// Matches from every backend, sorted, each name once.
pub(crate) fn prefix_match(odb: &ObjectDatabase, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
    let mut all = odb.loose.prefix_match(prefix)?;
    for pack in odb.packs().iter() {
        all.extend(OdbBackend::prefix_match(pack, prefix)?);
    }
    all.sort_unstable();
    all.dedup();
    Ok(all)
}

pub(crate) fn resolve_prefix(odb: &ObjectDatabase, prefix: &str) -> Result<ObjectId, OdbError> {
    if prefix.is_empty() || !is_hex_prefix(prefix) {
        return Err(OdbError::NotFound(prefix.to_string()));
    }
    if prefix.len() == HEX_LEN {
        let oid = ObjectId::from_hex(prefix)?;
        return if odb.contains(&oid) {
            Ok(oid)
        } else {
            Err(OdbError::NotFound(oid.to_hex()))
        };
    }

    let matches = prefix_match(odb, prefix)?;
    match matches.as_slice() {
        [] => Err(OdbError::NotFound(prefix.to_string())),
        [only] if prefix.len() >= MINIMUM_ABBREV => Ok(*only),
        _ => Err(OdbError::Ambiguous {
            prefix: prefix.to_string(),
            count: matches.len(),
        }),
    }
}
