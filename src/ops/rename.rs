//! `rename` (spec §4.J): atomically move `(from_parent, from_name)` to
//! `(to_parent, to_name)`.
//!
//! Two directories are mutated. Per the fixed lock-ordering invariant (spec
//! invariant 7's two-entry corollary — "two-entry operations lock in
//! ascending handle-hash order"), the content-lock mutation on whichever
//! parent hashes lower always happens first, so a concurrent rename in the
//! opposite direction between the same two directories can never deadlock.

use std::sync::Arc;

use crate::cityhash::city_hash64;
use crate::context::Context;
use crate::dirent;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

pub fn rename(
    cache: &Cache,
    from_parent: &Arc<Entry>,
    from_name: &[u8],
    to_parent: &Arc<Entry>,
    to_name: &[u8],
    ctx: &Context,
) -> Result<()> {
    let _from_guard = crate::ops::ref_entry(cache, from_parent)?;
    let _to_guard = crate::ops::ref_entry(cache, to_parent)?;

    let mut from_attrs = None;
    for parent in [from_parent, to_parent] {
        let attrs = crate::ops::kill_on_stale(cache, &parent.handle, lock_trust_attrs(parent, &*cache.backing, false))?;
        if attrs.kind != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &attrs, mask::MODIFY | mask::DELETE | mask::EXTEND, &cache.config.permission)?;
        if Arc::ptr_eq(parent, from_parent) {
            from_attrs = Some(attrs);
        }
    }
    let from_attrs = from_attrs.expect("from_parent is always iterated");

    let source_uid = match dirent::lookup_child(from_parent, from_name)? {
        Some(child) => lock_trust_attrs(&child, &*cache.backing, false)?.uid,
        None => {
            let lookup_result = cache.backing.lookup(&from_parent.handle, from_name).map_err(translate_backing_error);
            let (_, attrs) = crate::ops::kill_on_stale(cache, &from_parent.handle, lookup_result).map_err(|_| Error::NoSuchEntry)?;
            attrs.uid
        }
    };
    permission::check_sticky_delete(ctx, &from_attrs, source_uid)?;

    cache
        .backing
        .rename(&from_parent.handle, from_name, &to_parent.handle, to_name)
        .map_err(translate_backing_error)?;

    let from_hash = city_hash64(&from_parent.handle.0);
    let to_hash = city_hash64(&to_parent.handle.0);
    let moved = dirent::lookup_child(from_parent, from_name)?;

    // Ascending handle-hash order across the two content-lock mutations.
    let apply = |low: &Arc<Entry>, low_is_source: bool| -> Result<()> {
        if low_is_source {
            dirent::remove_child(low, from_name)
        } else if let Some(child) = &moved {
            dirent::insert_child(low, to_name.to_vec(), child)
        } else {
            Ok(())
        }
    };

    if from_hash <= to_hash {
        apply(from_parent, true)?;
        apply(to_parent, false)?;
    } else {
        apply(to_parent, false)?;
        apply(from_parent, true)?;
    }

    dirent::bump_cookie_verifier(from_parent)?;
    if !Arc::ptr_eq(from_parent, to_parent) {
        dirent::bump_cookie_verifier(to_parent)?;
    }
    cache.stats.record_rename();
    Ok(())
}
