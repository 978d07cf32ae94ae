//! `readlink` (spec §4.J): read a symlink's target, caching it on first use.

use std::sync::Arc;

use crate::context::Context;
use crate::entry::{lock_trust_attrs, translate_backing_error, Content, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn readlink(cache: &Cache, entry: &Arc<Entry>, ctx: &Context) -> Result<Vec<u8>> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
        if attrs.kind != Kind::Symlink {
            return Err(Error::InvalidArgument);
        }
        permission::require(ctx, &attrs, mask::READ, &cache.config.permission)?;
    }

    {
        let content = entry.content_lock.read();
        if let Content::Symlink { target, valid: true } = &*content {
            cache.stats.record_readlink();
            return Ok(target.clone());
        }
    }

    let target =
        crate::ops::kill_on_stale(cache, &entry.handle, cache.backing.readlink(&entry.handle).map_err(translate_backing_error))?;
    {
        let mut content = entry.content_lock.write();
        if let Content::Symlink { target: cached, valid } = &mut *content {
            *cached = target.clone();
            *valid = true;
        }
    }
    cache.stats.record_readlink();
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::backing::NewFileSpec;
    use crate::config::Config;
    use crate::ops::create::{create, CreateMode};

    #[test]
    fn readlink_returns_target_and_caches_it() {
        let backing = Arc::new(InMemoryBacking::new());
        let cache = Cache::new(backing.clone(), Config::default());
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        let spec = NewFileSpec { mode: 0o777, uid: 0, gid: 0 };
        let link = create(&cache, &root, b"l", CreateMode::Symlink { target: b"/etc/hosts" }, &spec, &Context::root()).unwrap();
        let target = readlink(&cache, &link, &Context::root()).unwrap();
        assert_eq!(target, b"/etc/hosts");
        let cached = readlink(&cache, &link, &Context::root()).unwrap();
        assert_eq!(cached, b"/etc/hosts");
    }
}
