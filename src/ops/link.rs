//! `link` (spec §4.J): create an additional hard link to an existing file.
//!
//! Two entries are touched (`source`, `new_parent`); per the fixed lock
//! ordering (spec invariant 7's two-entry corollary), the attribute lock
//! taken here is always `source`'s own, and the content lock mutated is
//! always `new_parent`'s — they never compete for the same lock kind on two
//! different entries, so no explicit hash-ordering is needed (contrast
//! [`crate::ops::rename`], which does need it).

use std::sync::Arc;

use crate::context::Context;
use crate::dirent;
use crate::entry::{fixup_after_write, lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn link(cache: &Cache, source: &Arc<Entry>, new_parent: &Arc<Entry>, name: &[u8], ctx: &Context) -> Result<()> {
    let _source_guard = crate::ops::ref_entry(cache, source)?;
    let _parent_guard = crate::ops::ref_entry(cache, new_parent)?;
    {
        let parent_attrs =
            crate::ops::kill_on_stale(cache, &new_parent.handle, lock_trust_attrs(new_parent, &*cache.backing, false))?;
        if parent_attrs.kind != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &parent_attrs, mask::MODIFY | mask::EXTEND, &cache.config.permission)?;
    }
    {
        let source_attrs = crate::ops::kill_on_stale(cache, &source.handle, lock_trust_attrs(source, &*cache.backing, false))?;
        if source_attrs.kind == Kind::Directory {
            return Err(Error::InvalidArgument);
        }
    }
    if dirent::lookup_child(new_parent, name)?.is_some() {
        return Err(Error::Exists);
    }

    let fresh = cache.backing.link(&source.handle, &new_parent.handle, name).map_err(translate_backing_error)?;
    {
        let mut guard = source.attr_lock.write();
        fixup_after_write(&mut guard, &fresh);
    }
    dirent::insert_child(new_parent, name.to_vec(), source)?;
    dirent::bump_cookie_verifier(new_parent)?;
    cache.stats.record_link();
    Ok(())
}
