//! `readdir` (spec §4.J): list directory entries, populating the cached name
//! index (and each listed child's own cache entry) as it goes.

use std::sync::Arc;

use crate::context::Context;
use crate::dirent;
use crate::entry::{lock_trust_attrs, translate_backing_error, Entry, Kind};
use crate::error::{Error, Result};
use crate::ops::Cache;
use crate::permission::{self, mask};

/// One page of directory listing results (spec §4.J `readdir`).
pub struct ReadDirPage {
    pub entries: Vec<(Vec<u8>, Arc<Entry>)>,
    pub end: bool,
    pub cookie_verifier: [u8; 8],
}

pub fn readdir(cache: &Cache, dir: &Arc<Entry>, cookie: u64, verifier: Option<[u8; 8]>, ctx: &Context) -> Result<ReadDirPage> {
    let _guard = crate::ops::ref_entry(cache, dir)?;
    {
        let attrs = crate::ops::kill_on_stale(cache, &dir.handle, lock_trust_attrs(dir, &*cache.backing, false))?;
        if attrs.kind != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        permission::require(ctx, &attrs, mask::READ | mask::LOOKUP, &cache.config.permission)?;
    }

    if cache.config.readdir.use_cookie_verifier && cookie != 0 {
        if let Some(expected) = verifier {
            if expected != dirent::cookie_verifier(dir)? {
                return Err(Error::Inconsistent);
            }
        }
    }

    let raw =
        crate::ops::kill_on_stale(cache, &dir.handle, cache.backing.readdir(&dir.handle, cookie).map_err(translate_backing_error))?;
    let mut entries = Vec::with_capacity(raw.entries.len());
    for item in &raw.entries {
        let child = cache.index.get_or_insert(&item.handle)?;
        dirent::insert_child(dir, item.name.clone(), &child)?;
        entries.push((item.name.clone(), child));
    }
    if raw.end {
        dirent::mark_populated(dir)?;
    }
    cache.stats.record_readdir();
    Ok(ReadDirPage { entries, end: raw.end, cookie_verifier: dirent::cookie_verifier(dir)? })
}
