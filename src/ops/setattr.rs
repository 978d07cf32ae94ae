//! `setattr` (spec §4.J, §4.I): apply attribute changes after authorization.

use std::sync::Arc;

use crate::backing::SetAttrs;
use crate::context::Context;
use crate::entry::{lock_trust_attrs, translate_backing_error, Attributes, Entry};
use crate::error::Result;
use crate::ops::Cache;
use crate::permission;

pub fn setattr(cache: &Cache, entry: &Arc<Entry>, changes: &SetAttrs, ctx: &Context) -> Result<Attributes> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
        permission::check_setattr(ctx, &attrs, changes, &cache.config.permission)?;
    }

    let fresh = cache.backing.setattr(&entry.handle, changes).map_err(translate_backing_error)?;
    let mut guard = entry.attr_lock.write();
    *guard = Attributes::from_backing(&fresh);
    cache.stats.record_setattr();
    Ok(guard.clone())
}
