//! `access` (spec §4.I): report which of a requested set of rights the
//! caller actually holds, without erroring on a partial grant.

use std::sync::Arc;

use crate::context::Context;
use crate::entry::{lock_trust_attrs, Entry};
use crate::error::Result;
use crate::ops::Cache;
use crate::permission;

pub fn access(cache: &Cache, entry: &Arc<Entry>, requested: u32, ctx: &Context) -> Result<u32> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
    Ok(permission::check_access(ctx, &attrs, requested, &cache.config.permission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::test_support::InMemoryBacking;
    use crate::config::Config;
    use crate::permission::mask;

    #[test]
    fn access_reports_granted_subset() {
        let backing = Arc::new(InMemoryBacking::new());
        let cache = Cache::new(backing.clone(), Config::default());
        let handle = backing.add_root_child(crate::backing::Kind::Regular, b"a");
        let entry = cache.index.get_or_insert(&handle).unwrap();
        entry.attr_lock.write().mode = 0o400;
        let granted = access(&cache, &entry, mask::READ | mask::EXECUTE, &Context::root()).unwrap();
        // Root bypasses the mode bits entirely, except execute when no
        // execute bit is set anywhere on the file.
        assert_eq!(granted, mask::READ);
    }
}
