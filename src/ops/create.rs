//! `create` (spec §4.J): make a regular file, directory, symlink, or special
//! node under a directory entry.

use std::sync::Arc;

use crate::backing::{self, Device, NewFileSpec};
use crate::context::Context;
use crate::dirent;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

/// What kind of object to create (spec §4.J `create` "mode").
pub enum CreateMode<'a> {
    Regular,
    Directory,
    Symlink { target: &'a [u8] },
    Special { kind: Kind, device: Option<Device> },
}

pub fn create(
    cache: &Cache,
    parent: &Arc<Entry>,
    name: &[u8],
    mode: CreateMode<'_>,
    spec: &NewFileSpec,
    ctx: &Context,
) -> Result<Arc<Entry>> {
    let _guard = crate::ops::ref_entry(cache, parent)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &parent.handle, lock_trust_attrs(parent, &*cache.backing, false))?;
        if attrs.kind != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &attrs, mask::MODIFY | mask::EXTEND, &cache.config.permission)?;
    }

    if dirent::lookup_child(parent, name)?.is_some() {
        return Err(Error::Exists);
    }

    let (handle, attrs) = match mode {
        CreateMode::Regular => cache.backing.create_regular(&parent.handle, name, spec),
        CreateMode::Directory => cache.backing.mkdir(&parent.handle, name, spec),
        CreateMode::Symlink { target } => cache.backing.symlink(&parent.handle, name, target, spec),
        CreateMode::Special { kind, device } => {
            cache.backing.mknode(&parent.handle, name, to_backing_kind(kind)?, device, spec)
        }
    }
    .map_err(translate_backing_error)?;

    let child = cache.index.insert_fresh(&handle, &attrs);
    dirent::insert_child(parent, name.to_vec(), &child)?;
    dirent::bump_cookie_verifier(parent)?;
    cache.stats.record_create();
    Ok(child)
}

fn to_backing_kind(kind: Kind) -> Result<backing::Kind> {
    Ok(match kind {
        Kind::Block => backing::Kind::Block,
        Kind::Character => backing::Kind::Character,
        Kind::Socket => backing::Kind::Socket,
        Kind::Fifo => backing::Kind::Fifo,
        _ => return Err(Error::InvalidArgument),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::config::Config;

    fn cache() -> (Cache, Arc<InMemoryBacking>) {
        let backing = Arc::new(InMemoryBacking::new());
        (Cache::new(backing.clone(), Config::default()), backing)
    }

    fn spec() -> NewFileSpec {
        NewFileSpec { mode: 0o644, uid: 0, gid: 0 }
    }

    #[test]
    fn create_regular_then_duplicate_name_fails() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        create(&cache, &root, b"a", CreateMode::Regular, &spec(), &Context::root()).unwrap();
        let err = create(&cache, &root, b"a", CreateMode::Regular, &spec(), &Context::root()).unwrap_err();
        assert_eq!(err, Error::Exists);
    }

    #[test]
    fn create_directory_is_visible_via_lookup() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        let dir = create(&cache, &root, b"sub", CreateMode::Directory, &spec(), &Context::root()).unwrap();
        assert_eq!(dir.attr_lock.read().kind, Kind::Directory);
        let found = crate::ops::lookup::lookup(&cache, &root, b"sub", &Context::root()).unwrap();
        assert!(Arc::ptr_eq(&dir, &found));
    }
}
