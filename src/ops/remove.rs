//! `remove` (spec §4.J): unlink a non-directory entry or remove an empty
//! directory.

use std::sync::Arc;

use crate::context::Context;
use crate::dirent;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn remove(cache: &Cache, parent: &Arc<Entry>, name: &[u8], ctx: &Context) -> Result<()> {
    let _guard = crate::ops::ref_entry(cache, parent)?;
    let parent_attrs = {
        let attrs = crate::ops::kill_on_stale(cache, &parent.handle, lock_trust_attrs(parent, &*cache.backing, false))?;
        if attrs.kind != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &attrs, mask::MODIFY | mask::DELETE, &cache.config.permission)?;
        attrs
    };

    let child = dirent::lookup_child(parent, name)?;
    let _child_guard = child.as_ref().map(|c| crate::ops::ref_entry(cache, c)).transpose()?;

    let (target_kind, target_uid) = match &child {
        Some(c) => {
            let attrs = crate::ops::kill_on_stale(cache, &c.handle, lock_trust_attrs(c, &*cache.backing, false))?;
            (attrs.kind, attrs.uid)
        }
        None => {
            let (_, attrs) = crate::ops::kill_on_stale(
                cache,
                &parent.handle,
                cache.backing.lookup(&parent.handle, name).map_err(translate_backing_error),
            )?;
            (attrs.kind.into(), attrs.uid)
        }
    };

    permission::check_sticky_delete(ctx, &parent_attrs, target_uid)?;

    match target_kind {
        Kind::Directory => cache.backing.rmdir(&parent.handle, name),
        _ => cache.backing.unlink(&parent.handle, name),
    }
    .map_err(translate_backing_error)?;

    dirent::remove_child(parent, name)?;
    dirent::bump_cookie_verifier(parent)?;
    if let Some(child) = &child {
        // The backing layer has already dropped its link; force the next
        // access to re-fetch attrs (picks up an nlink decrement) rather than
        // trusting whatever was cached before the removal.
        {
            let mut attrs = child.attr_lock.write();
            attrs.attrs_trusted = false;
        }
        let refreshed = cache.backing.getattr(&child.handle).ok();
        if let Some(fresh) = refreshed {
            let mut attrs = child.attr_lock.write();
            crate::entry::fixup_after_write(&mut attrs, &fresh);
            if fresh.nlink == 0 && !child.holds_state() {
                drop(attrs);
                cache.index.kill(&child.handle);
            }
        }
    }
    cache.stats.record_remove();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::backing::NewFileSpec;
    use crate::config::Config;
    use crate::ops::create::{create, CreateMode};
    use crate::ops::lookup::lookup;

    fn cache() -> (Cache, Arc<InMemoryBacking>) {
        let backing = Arc::new(InMemoryBacking::new());
        (Cache::new(backing.clone(), Config::default()), backing)
    }

    #[test]
    fn remove_then_lookup_misses() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        let spec = NewFileSpec { mode: 0o644, uid: 0, gid: 0 };
        create(&cache, &root, b"a", CreateMode::Regular, &spec, &Context::root()).unwrap();
        remove(&cache, &root, b"a", &Context::root()).unwrap();
        assert_eq!(lookup(&cache, &root, b"a", &Context::root()).unwrap_err(), Error::NoSuchEntry);
    }

    #[test]
    fn remove_nonempty_directory_fails() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        let spec = NewFileSpec { mode: 0o755, uid: 0, gid: 0 };
        create(&cache, &root, b"d", CreateMode::Directory, &spec, &Context::root()).unwrap();
        let dir = lookup(&cache, &root, b"d", &Context::root()).unwrap();
        create(&cache, &dir, b"child", CreateMode::Regular, &spec, &Context::root()).unwrap();
        let err = remove(&cache, &root, b"d", &Context::root()).unwrap_err();
        assert_eq!(err, Error::DirNotEmpty);
    }

    #[test]
    fn sticky_directory_blocks_non_owner_removal() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        let sticky_spec = NewFileSpec { mode: 0o1777, uid: 0, gid: 0 };
        let owner_ctx = Context { uid: 10, gid: 10, ..Context::root() };
        let other_ctx = Context { uid: 20, gid: 20, ..Context::root() };
        let dir = create(&cache, &root, b"tmp", CreateMode::Directory, &sticky_spec, &Context::root()).unwrap();
        create(&cache, &dir, b"file", CreateMode::Regular, &NewFileSpec { mode: 0o644, uid: 10, gid: 10 }, &owner_ctx).unwrap();

        let err = remove(&cache, &dir, b"file", &other_ctx).unwrap_err();
        assert_eq!(err, Error::PermissionDenied);
        assert!(remove(&cache, &dir, b"file", &owner_ctx).is_ok());
    }
}
