//! Lookup across backends.
//!
//! Loose objects are searched first, then packs in discovery order. A
//! ref-delta whose base lives outside its own pack is resolved through the
//! loose store and the other packs.

use git_hash::ObjectId;
use git_object::{ObjectInfo, RawObject};
use git_pack::pack::PackFile;
use git_pack::PackError;

use crate::{ObjectDatabase, OdbError};

pub(crate) fn find_raw(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
    if let Some(raw) = odb.loose.read_raw(oid)? {
        return Ok(Some(raw));
    }
    let packs = odb.packs();
    for (i, pack) in packs.iter().enumerate() {
        let resolver = |base: &ObjectId| external_base(odb, &packs, i, base);
        if let Some(raw) = pack.read_raw_with(oid, resolver)? {
            return Ok(Some(raw));
        }
    }
    Ok(None)
}

pub(crate) fn find_info(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
    if let Some(info) = odb.loose.read_info(oid)? {
        return Ok(Some(info));
    }
    let packs = odb.packs();
    for (i, pack) in packs.iter().enumerate() {
        let resolver = |base: &ObjectId| external_info(odb, &packs, i, base);
        if let Some(info) = pack.read_info_with(oid, resolver)? {
            return Ok(Some(info));
        }
    }
    Ok(None)
}

pub(crate) fn object_exists(odb: &ObjectDatabase, oid: &ObjectId) -> bool {
    odb.loose.contains(oid) || odb.packs().iter().any(|pack| pack.contains(oid))
}

/// Base of a ref-delta in pack `skip`, looked up everywhere else. Bases in
/// other packs are read without a resolver, so cross-pack chains are one
/// hop deep.
fn external_base(
    odb: &ObjectDatabase,
    packs: &[PackFile],
    skip: usize,
    base: &ObjectId,
) -> Result<Option<RawObject>, PackError> {
    if let Some(raw) = odb.loose.read_raw(base).map_err(boxed)? {
        return Ok(Some(raw));
    }
    for (_, pack) in packs.iter().enumerate().filter(|(i, _)| *i != skip) {
        if let Some(raw) = pack.read_raw(base)? {
            return Ok(Some(raw));
        }
    }
    Ok(None)
}

fn external_info(
    odb: &ObjectDatabase,
    packs: &[PackFile],
    skip: usize,
    base: &ObjectId,
) -> Result<Option<ObjectInfo>, PackError> {
    if let Some(info) = odb.loose.read_info(base).map_err(boxed)? {
        return Ok(Some(info));
    }
    for (_, pack) in packs.iter().enumerate().filter(|(i, _)| *i != skip) {
        if let Some(info) = pack.read_info(base)? {
            return Ok(Some(info));
        }
    }
    Ok(None)
}

fn boxed(err: git_loose::LooseError) -> PackError {
    PackError::Store(Box::new(err))
}
