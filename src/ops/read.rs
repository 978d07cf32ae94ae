//! `read` (spec §4.J): read bytes from a regular file via its cached fd.

use std::sync::Arc;

use crate::backing::OpenFlags;
use crate::context::Context;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::fd_cache;
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn read(cache: &Cache, entry: &Arc<Entry>, offset: u64, len: u32, ctx: &Context) -> Result<Vec<u8>> {
    let _guard = crate::ops::ref_entry(cache, entry)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &entry.handle, lock_trust_attrs(entry, &*cache.backing, false))?;
        if attrs.kind != Kind::Regular {
            return Err(Error::InvalidArgument);
        }
        permission::require(ctx, &attrs, mask::READ, &cache.config.permission)?;
    }

    let fd = fd_cache::ensure_open(entry, &*cache.backing, OpenFlags::Read, &cache.lru)?;
    let data = cache.backing.read(fd, offset, len).map_err(translate_backing_error)?;
    cache.stats.record_read();
    Ok(data)
}
