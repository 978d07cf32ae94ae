//! `invalidate` (spec §4.J): force the next access to re-fetch attributes
//! and content from the backing adapter, without removing the entry from
//! the index (contrast [`crate::ops::kill`]).

use crate::backing::BackingHandle;
use crate::ops::Cache;

pub fn invalidate(cache: &Cache, handle: &BackingHandle) {
    cache.index.invalidate(handle);
}
