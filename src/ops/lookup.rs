//! `lookup` (spec §4.J): resolve a name within a directory, consulting the
//! cached name index before falling through to the backing adapter.

use std::sync::Arc;

use crate::context::Context;
use crate::dirent;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn lookup(cache: &Cache, parent: &Arc<Entry>, name: &[u8], ctx: &Context) -> Result<Arc<Entry>> {
    let _guard = crate::ops::ref_entry(cache, parent)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &parent.handle, lock_trust_attrs(parent, &*cache.backing, false))?;
        if attrs.kind != crate::entry::Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &attrs, mask::LOOKUP, &cache.config.permission)?;
    }

    if let Some(weak_hit) = dirent::lookup_child(parent, name)? {
        // The dirent map hands back an un-ref'd promotion (spec §4.F); re-fetch
        // through the index to add the caller's reference and touch the LRU,
        // falling through to a fresh backing lookup if it died in the interim.
        if let Some(child) = cache.index.get_latched(&weak_hit.handle) {
            cache.stats.record_lookup();
            return Ok(child);
        }
    }

    let lookup_result = cache.backing.lookup(&parent.handle, name).map_err(translate_backing_error);
    let (handle, attrs) = match lookup_result {
        Err(Error::StaleHandle) => {
            dirent::remove_child(parent, name)?;
            return Err(Error::StaleHandle);
        }
        other => other?,
    };
    let child = cache.index.insert_fresh(&handle, &attrs);
    dirent::insert_child(parent, name.to_vec(), &child)?;
    cache.stats.record_lookup();
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::backing::Kind;
    use crate::config::Config;
    use crate::context::Context as Ctx;

    fn cache() -> (Cache, Arc<InMemoryBacking>) {
        let backing = Arc::new(InMemoryBacking::new());
        (Cache::new(backing.clone(), Config::default()), backing)
    }

    #[test]
    fn lookup_populates_cache_on_miss_then_hits() {
        let (cache, backing) = cache();
        let root_handle = backing.root();
        backing.add_root_child(Kind::Regular, b"file");
        let root = cache.index.get_or_insert(&root_handle).unwrap();
        let found = lookup(&cache, &root, b"file", &Ctx::root()).unwrap();
        assert_eq!(found.handle, cache.backing.lookup(&root_handle, b"file").unwrap().0);
        let found_again = lookup(&cache, &root, b"file", &Ctx::root()).unwrap();
        assert!(Arc::ptr_eq(&found, &found_again));
    }

    #[test]
    fn lookup_missing_name_errors() {
        let (cache, backing) = cache();
        let root = cache.index.get_or_insert(&backing.root()).unwrap();
        assert_eq!(lookup(&cache, &root, b"nope", &Ctx::root()).unwrap_err(), Error::NoSuchEntry);
    }
}
