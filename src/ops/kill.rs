//! `kill` (spec §3 "Kill", §4.J): forcibly remove an entry from the index,
//! invalidating every weak reference to it (dirents, state) and notifying
//! the backing adapter so it can release any resources it still associates
//! with the handle.

use crate::backing::BackingHandle;
use crate::ops::Cache;

pub fn kill(cache: &Cache, handle: &BackingHandle) {
    cache.index.kill(handle);
}
