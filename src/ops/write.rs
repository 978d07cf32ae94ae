//! `write` (spec §4.J): write bytes to a regular file via its cached fd,
//! refreshing cached attributes from the result (spec §4.E `fixup_after_write`).

use std::sync::Arc;

use crate::backing::OpenFlags;
use crate::context::Context;
use crate::entry::{fixup_after_write, lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::fd_cache;
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn write(cache: &Cache, entry: &Arc<Entry>, offset: u64, data: &[u8], ctx: &Context) -> Result<u32> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
        if attrs.kind != Kind::Regular {
            return Err(Error::InvalidArgument);
        }
        permission::require(ctx, &attrs, mask::MODIFY, &cache.config.permission)?;
    }

    let fd = fd_cache::ensure_open(entry, &*cache.backing, OpenFlags::Write, &cache.lru)?;
    let written = cache.backing.write(fd, offset, data).map_err(translate_backing_error)?;

    let fresh = cache.backing.getattr(&entry.handle).map_err(translate_backing_error)?;
    {
        let mut guard = entry.attr_lock.write();
        fixup_after_write(&mut guard, &fresh);
    }
    cache.stats.record_write();
    Ok(written)
}
